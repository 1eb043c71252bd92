use libm::fabsf;

/// Tuning constants of [`KinematicEstimator`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimatorTuning {
    /// Standard deviation of one altitude measurement (m)
    pub measurement_std: f32,
    /// Standard deviation of the acceleration model below the transonic threshold (m/s²)
    pub subsonic_model_std: f32,
    /// Standard deviation of the acceleration model above the transonic threshold (m/s²)
    pub transonic_model_std: f32,
    /// Acceleration change rate at which the smoothed velocity moves half way (m/s³)
    pub reference_jerk: f32,
    /// m/s
    pub transonic_velocity_threshold: f32,
}

impl Default for EstimatorTuning {
    fn default() -> Self {
        Self {
            measurement_std: 1.0,
            subsonic_model_std: 2.0,
            transonic_model_std: 20.0,
            reference_jerk: 200.0,
            transonic_velocity_threshold: 170.0,
        }
    }
}

/// Kalman filter over a constant acceleration model, followed by an adaptive
/// smoothing filter on the velocity.
///
/// State vector  x = [ altitude, vertical_speed, vertical_acceleration ]ᵀ
/// Measurement   z = altitude (m)
///
/// ```text
///     F = ⎡1  T  T²/2⎤     H = ⎡1  0  0⎤
///         ⎢0  1  T   ⎥
///         ⎣0  0  1   ⎦
/// ```
///
/// The covariance is symmetric, so only six of its entries are tracked and the
/// products `F P Fᵀ + Q` are expanded by hand.
///
/// The smoothed velocity follows the Kalman velocity with a gain of
/// `1 / (1 + |Δa| / (jerk_ref · T))`: during smooth flight it tracks closely,
/// during violent transients (motor burnout, parachute snatch) it holds.
#[derive(Debug, Clone)]
pub struct KinematicEstimator {
    tuning: EstimatorTuning,
    /// time step (s)
    t: f32,
    /// T²/2
    t2: f32,
    measurement_variance: f32,
    subsonic_model_variance: f32,
    transonic_model_variance: f32,
    inverse_reference_change: f32,

    s: f32,
    v: f32,
    a: f32,
    smoothed_v: f32,

    p00: f32,
    p01: f32,
    p02: f32,
    p11: f32,
    p12: f32,
    p22: f32,

    k0: f32,
    k1: f32,
    k2: f32,
}

impl KinematicEstimator {
    pub fn new(tuning: EstimatorTuning, delta_t_s: f32, initial_altitude: f32) -> Self {
        let measurement_variance = tuning.measurement_std * tuning.measurement_std;
        let mut estimator = Self {
            tuning,
            t: delta_t_s,
            t2: delta_t_s * delta_t_s / 2.0,
            measurement_variance,
            subsonic_model_variance: tuning.subsonic_model_std * tuning.subsonic_model_std,
            transonic_model_variance: tuning.transonic_model_std * tuning.transonic_model_std,
            inverse_reference_change: 1.0 / (tuning.reference_jerk * delta_t_s),
            s: 0.0,
            v: 0.0,
            a: 0.0,
            smoothed_v: 0.0,
            p00: 0.0,
            p01: 0.0,
            p02: 0.0,
            p11: 0.0,
            p12: 0.0,
            p22: 0.0,
            k0: 0.0,
            k1: 0.0,
            k2: 0.0,
        };
        estimator.reset(initial_altitude);
        estimator
    }

    /// Restarts the filter at rest at `altitude`.
    pub fn reset(&mut self, altitude: f32) {
        let t = self.t;
        let t2 = t * t;
        let t3 = t2 * t;
        let t4 = t2 * t2;
        let vexp = self.measurement_variance;
        let vmod = self.subsonic_model_variance;

        self.s = altitude;
        self.v = 0.0;
        self.a = 0.0;
        self.smoothed_v = 0.0;

        self.p00 = vexp + vmod * t4 * t2 / 36.0;
        self.p11 = vexp / t + vmod * t4 / 4.0;
        self.p22 = vexp / t2;
        self.p01 = vmod * t4 * t / 12.0;
        self.p02 = vmod * t4 / 6.0;
        self.p12 = vmod * t3 / 2.0;

        self.k0 = 0.0;
        self.k1 = 0.0;
        self.k2 = 0.0;
    }

    /// Runs one predict / update cycle with the altitude measured this tick.
    pub fn process(&mut self, measurement: f32) {
        let t = self.t;
        let t2 = self.t2;

        // predict
        self.s += self.v * t + self.a * t2;
        self.v += self.a * t;
        let previous_a = self.a;

        let vmod = if self.v > self.tuning.transonic_velocity_threshold {
            self.transonic_model_variance
        } else {
            self.subsonic_model_variance
        };

        let c1 = self.p22 * t2;
        let c2 = self.p22 * t;
        let ph00 = (c1 + 2.0 * self.p12 * t + 2.0 * self.p02) * t2
            + (self.p11 * t + 2.0 * self.p01) * t
            + self.p00;
        let ph11 = (c2 + 2.0 * self.p12) * t + self.p11;
        let ph22 = self.p22 + vmod * t * t;
        let ph01 = (c2 + self.p12) * t2 + (self.p12 * t + self.p02 + self.p11) * t + self.p01;
        let ph02 = c1 + self.p12 * t + self.p02;
        let ph12 = c2 + self.p12;

        // update
        let s_inv = 1.0 / (ph00 + self.measurement_variance);
        self.k0 = ph00 * s_inv;
        self.k1 = ph01 * s_inv;
        self.k2 = ph02 * s_inv;

        let innovation = measurement - self.s;
        self.s += self.k0 * innovation;
        self.v += self.k1 * innovation;
        self.a += self.k2 * innovation;

        let r = 1.0 - self.k0;
        self.p00 = r * ph00;
        self.p01 = r * ph01;
        self.p02 = r * ph02;
        self.p11 = ph11 - self.k1 * ph01;
        self.p12 = ph12 - self.k1 * ph02;
        self.p22 = ph22 - self.k2 * ph02;

        // adaptive smoothing
        let da = fabsf(self.a - previous_a);
        self.smoothed_v += (self.v - self.smoothed_v) / (1.0 + da * self.inverse_reference_change);
    }

    /// Moves the position origin by `offset` meters without touching the
    /// dynamics, used when the altitude baseline is corrected.
    pub fn shift_origin(&mut self, offset: f32) {
        self.s -= offset;
    }

    pub fn position(&self) -> f32 {
        self.s
    }

    pub fn velocity(&self) -> f32 {
        self.v
    }

    pub fn acceleration(&self) -> f32 {
        self.a
    }

    pub fn smoothed_velocity(&self) -> f32 {
        self.smoothed_v
    }

    /// Gains of the last update, position first.
    pub fn gains(&self) -> [f32; 3] {
        [self.k0, self.k1, self.k2]
    }

    /// Upper triangle of the covariance: p00, p01, p02, p11, p12, p22.
    pub fn covariance(&self) -> [f32; 6] {
        [self.p00, self.p01, self.p02, self.p11, self.p12, self.p22]
    }
}
