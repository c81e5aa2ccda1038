use std::io;
use std::process::{Child, ExitStatus};

pub const JAVA_EXECUTABLE: &str = "java.exe";

pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Console control events are delivered to the runtime directly; the
/// launcher keeps the default handling.
pub struct SignalGuard;

impl SignalGuard {
    pub fn install() -> io::Result<Self> {
        Ok(Self)
    }

    pub fn watch(&self, _child: &Child) {}
}
