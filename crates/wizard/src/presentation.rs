//! Collaborators the wizard drives but does not own.

/// The user-facing layer rendering the wizard.
pub trait Presentation: Send + Sync {
    /// Show the view for `step`.
    fn transact_to(&self, step: &str);

    /// Surface one user-facing message.
    fn show_notice(&self, message: &str);

    /// Dismiss any on-screen keyboard or other input method.
    fn hide_input_method(&self);
}

/// Countdown alarm owned by the host platform.
pub trait CountdownAlarm: Send + Sync {
    /// Stop the alarm. Must be safe to call when nothing is running.
    fn stop_alarm(&self);
}

/// An alarm that does nothing, for hosts without countdown support.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentAlarm;

impl CountdownAlarm for SilentAlarm {
    fn stop_alarm(&self) {}
}
