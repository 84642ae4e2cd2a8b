use crate::core::alarm::{Level, Notifier};
use crate::core::ent::{CheckStatus, Transition};

// Records transitions and raises the matching alarms.
pub struct Logger {
    alarms: Vec<Box<dyn Notifier>>,
}

impl Logger {
    pub fn new(alarms: Vec<Box<dyn Notifier>>) -> Logger {
        Logger { alarms }
    }

    /// Category and text for one transition.
    pub fn message(transition: &Transition) -> (Level, String) {
        match transition {
            Transition::BecamePassing(c) => (
                Level::Good,
                format!(
                    "[{}] {} is back to normal\nNotes: {}\nOutput: {}",
                    c.node, c.service_id, c.notes, c.output
                ),
            ),
            Transition::BecameCritical(c) => match c.status {
                CheckStatus::Warning => (
                    Level::Warning,
                    format!(
                        "[{}] {} is having problems\nNotes: {}\nOutput: {}",
                        c.node, c.service_id, c.notes, c.output
                    ),
                ),
                CheckStatus::Maintenance => (
                    Level::Message,
                    format!("[{}] {} is under maintenance\nNotes: {}", c.node, c.service_id, c.notes),
                ),
                CheckStatus::Critical | CheckStatus::Passing => (
                    Level::Danger,
                    format!(
                        "[{}] {} is critical\nNotes: {}\nOutput: {}",
                        c.node, c.service_id, c.notes, c.output
                    ),
                ),
            },
        }
    }

    /// Forwards every transition, in order, to every alarm.
    /// Delivery failures are logged and skipped.
    pub async fn log(&self, batch: &[Transition]) {
        for transition in batch {
            let (level, text) = Logger::message(transition);
            let check = transition.check();
            tracing::info!(
                node = %check.node,
                service = %check.service_id,
                level = ?level,
                "transition"
            );
            for alarm in &self.alarms {
                if let Err(e) = alarm.send(level, &text).await {
                    tracing::error!(service = %check.service_id, error = %e, "could not deliver notification");
                }
            }
        }
    }
}
