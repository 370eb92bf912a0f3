use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::transition::{EntityRef, TransitionId};

/// Initialize structured logging.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    tracing::info!("Scheduled transitions telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the log lines of one unit of work
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span for work on a single transition
pub fn create_transition_span(
    operation: &str,
    transition_id: TransitionId,
    entity: Option<&EntityRef>,
    correlation_id: &str,
) -> tracing::Span {
    tracing::info_span!(
        "scheduled_transition",
        operation = operation,
        transition.id = transition_id.0,
        entity = entity.map(tracing::field::display),
        correlation.id = correlation_id,
    )
}

/// Span for a periodic sweep (job creator, retention, queue drain)
pub fn create_sweep_span(operation: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "scheduled_transitions_sweep",
        operation = operation,
        correlation.id = correlation_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_unique_uuids() {
        let a = generate_correlation_id();
        let b = generate_correlation_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
