use once_cell::sync::OnceCell;
use std::sync::Once;
use tracing_appender::non_blocking::WorkerGuard;

// Dropping the guard stops the background writer, so it lives for the process
pub static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
pub static INIT_ONCE: Once = Once::new();
pub static INIT_ERROR: OnceCell<String> = OnceCell::new();
