//! Discrete PID controller with anti-windup and output saturation.
//!
//! Used by the steer/speed vehicle controllers, one instance per driven wheel.

/// PID controller with clamped integral and clamped output.
///
/// The integral accumulator is bounded so that `|ki * integral| <= max_out`,
/// which keeps the controller responsive after long saturation periods.
#[derive(Debug, Clone)]
pub struct PidController {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
    /// Maximum absolute output value
    pub max_out: f64,
    integral: f64,
    last_error: f64,
}

impl PidController {
    pub fn new(kp: f64, ki: f64, kd: f64, max_out: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            max_out,
            integral: 0.0,
            last_error: 0.0,
        }
    }

    /// Reset the integral and derivative state.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
    }

    /// Advance one step with the given error and time delta, returning the
    /// clamped control output.
    pub fn compute(&mut self, error: f64, dt: f64) -> f64 {
        let derivative = if dt > 0.0 {
            (error - self.last_error) / dt
        } else {
            0.0
        };
        self.last_error = error;

        if dt > 0.0 {
            self.integral += error * dt;
            // Anti-windup: bound the integral contribution by the output limit
            if self.ki != 0.0 && self.max_out > 0.0 {
                let limit = self.max_out / self.ki.abs();
                self.integral = self.integral.clamp(-limit, limit);
            }
        }

        let output = self.kp * error + self.ki * self.integral + self.kd * derivative;
        if self.max_out > 0.0 {
            output.clamp(-self.max_out, self.max_out)
        } else {
            output
        }
    }

    /// Current integral accumulator value.
    pub fn integral(&self) -> f64 {
        self.integral
    }
}
