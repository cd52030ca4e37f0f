use std::collections::HashMap;

use crate::models::FulfillmentStatus;

/// Built-in board labels, Spanish and English.
const DEFAULT_LABELS: &[(&str, FulfillmentStatus)] = &[
    ("pedido", FulfillmentStatus::Ordered),
    ("pedido recibido", FulfillmentStatus::Ordered),
    ("ordered", FulfillmentStatus::Ordered),
    ("nuevo", FulfillmentStatus::Ordered),
    ("en proceso", FulfillmentStatus::InProcess),
    ("procesando", FulfillmentStatus::InProcess),
    ("working on it", FulfillmentStatus::InProcess),
    ("in process", FulfillmentStatus::InProcess),
    ("in progress", FulfillmentStatus::InProcess),
    ("listo", FulfillmentStatus::ReadyForPickup),
    ("listo para recoger", FulfillmentStatus::ReadyForPickup),
    ("listo para entregar", FulfillmentStatus::ReadyForPickup),
    ("ready", FulfillmentStatus::ReadyForPickup),
    ("ready for pickup", FulfillmentStatus::ReadyForPickup),
    ("entregado", FulfillmentStatus::Delivered),
    ("delivered", FulfillmentStatus::Delivered),
    ("done", FulfillmentStatus::Delivered),
    ("cancelado", FulfillmentStatus::Cancelled),
    ("cancelled", FulfillmentStatus::Cancelled),
    ("canceled", FulfillmentStatus::Cancelled),
];

/// Maps free-text board status labels to fulfillment states.
#[derive(Debug, Clone)]
pub struct StatusLabelMap {
    labels: HashMap<String, FulfillmentStatus>,
}

impl Default for StatusLabelMap {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS
                .iter()
                .map(|(label, status)| (label.to_string(), *status))
                .collect(),
        }
    }
}

fn normalize(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl StatusLabelMap {
    /// Uses the configured table, or the built-in one when none is configured.
    pub fn from_config(configured: &HashMap<String, FulfillmentStatus>) -> Self {
        if configured.is_empty() {
            return Self::default();
        }
        Self {
            labels: configured
                .iter()
                .map(|(label, status)| (normalize(label), *status))
                .collect(),
        }
    }

    pub fn resolve(&self, label: &str) -> Option<FulfillmentStatus> {
        self.labels.get(&normalize(label)).copied()
    }
}
