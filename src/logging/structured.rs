use tracing::{debug, error, info, warn};

/// Context information for log messages
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "dashboard", "telemetry", "web")
    pub component: String,
    /// Window the message concerns
    pub window_id: Option<String>,
    /// Cycle the message belongs to
    pub cycle_id: Option<String>,
}

impl LogContext {
    /// Create a new log context
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            window_id: None,
            cycle_id: None,
        }
    }

    pub fn with_window(mut self, window_id: &str) -> Self {
        self.window_id = Some(window_id.to_string());
        self
    }

    pub fn with_cycle(mut self, cycle_id: &str) -> Self {
        self.cycle_id = Some(cycle_id.to_string());
        self
    }
}

/// Structured logger with context
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context: LogContext,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    /// Derive a logger for one cycle of one window
    pub fn for_cycle(&self, window_id: &str, cycle_id: &str) -> Self {
        Self::new(
            self.context
                .clone()
                .with_window(window_id)
                .with_cycle(cycle_id),
        )
    }

    pub fn info(&self, message: &str) {
        let fields = self.format_fields();
        info!(%fields, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        let fields = self.format_fields();
        warn!(%fields, "{}", message);
    }

    pub fn error(&self, message: &str) {
        let fields = self.format_fields();
        error!(%fields, "{}", message);
    }

    pub fn debug(&self, message: &str) {
        let fields = self.format_fields();
        debug!(%fields, "{}", message);
    }

    fn format_fields(&self) -> String {
        let mut fields = vec![format!("component={}", self.context.component)];
        if let Some(ref window_id) = self.context.window_id {
            fields.push(format!("window={}", window_id));
        }
        if let Some(ref cycle_id) = self.context.cycle_id {
            fields.push(format!("cycle={}", cycle_id));
        }
        fields.join(",")
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}
