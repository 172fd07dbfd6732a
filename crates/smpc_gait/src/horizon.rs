/// Per-sample data of the current preview window.
///
/// All arrays have length `N` except `lb`/`ub`, which hold two entries per
/// sample: the x-axis bound followed by the y-axis bound, both expressed in
/// the sample's rotated foot frame. The buffers are allocated once and
/// rewritten on every tick.
#[derive(Debug, Clone)]
pub struct Horizon {
    /// Sampling periods [s].
    pub t: Vec<f64>,
    /// Per-sample `hCoM / g`.
    pub h: Vec<f64>,
    /// Foot headings [rad].
    pub angle: Vec<f64>,
    /// Reference ZMP, world frame.
    pub zref_x: Vec<f64>,
    pub zref_y: Vec<f64>,
    /// Footprint centers, world frame.
    pub fp_x: Vec<f64>,
    pub fp_y: Vec<f64>,
    /// Rotated-frame box bounds, stride 2 per sample.
    pub lb: Vec<f64>,
    pub ub: Vec<f64>,
}

impl Horizon {
    #[must_use]
    pub fn new(n: usize, sampling_period: f64, height_ratio: f64) -> Self {
        Self {
            t: vec![sampling_period; n],
            h: vec![height_ratio; n],
            angle: vec![0.0; n],
            zref_x: vec![0.0; n],
            zref_y: vec![0.0; n],
            fp_x: vec![0.0; n],
            fp_y: vec![0.0; n],
            lb: vec![0.0; 2 * n],
            ub: vec![0.0; 2 * n],
        }
    }

    /// Number of preview samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.angle.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.angle.is_empty()
    }
}
