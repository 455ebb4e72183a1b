//! Per-joint hardware handle consumed by the control cycle.

/// One actuated joint as exposed by the hardware (or simulation) layer.
///
/// The control cycle reads position and velocity of every joint before
/// computing and writes exactly one effort command per joint afterwards.
pub trait JointHandle: Send {
    /// Joint name, matched against the robot description at startup.
    fn name(&self) -> &str;

    /// Joint position (rad).
    fn position(&self) -> f64;

    /// Joint velocity (rad/s).
    fn velocity(&self) -> f64;

    /// Effort command (Nm), already saturated by the caller.
    fn set_command(&mut self, effort: f64);
}

impl<H: JointHandle + ?Sized> JointHandle for Box<H> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn position(&self) -> f64 {
        (**self).position()
    }

    fn velocity(&self) -> f64 {
        (**self).velocity()
    }

    fn set_command(&mut self, effort: f64) {
        (**self).set_command(effort);
    }
}
