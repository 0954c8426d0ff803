//! Bridge lifecycle state.

/// Lifecycle of a bridge instance. There is no way back to `Uninitialized`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BridgeState {
    /// No transport wired yet. Handlers and listeners may be registered.
    #[default]
    Uninitialized,

    /// Transport wired; calls and events flow.
    Ready,
}

impl BridgeState {
    /// Returns true once the bridge is ready.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns a simple string representation of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Ready => "Ready",
        }
    }
}
