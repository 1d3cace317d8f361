//! Evaluation reporting seam.

/// One loss evaluation, broken into its terms.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub value: f64,
    /// Image data term, already weighted. Zero for joint losses, which
    /// report through `mode_terms` instead.
    pub data_term: f64,
    /// Smoothness regularizer, already weighted.
    pub reg_term: f64,
    /// Weighted per-mode contributions `(alpha * v0, (1 - alpha) * v1)`
    /// when the loss blends two modes.
    pub mode_terms: Option<(f64, f64)>,
    /// Cosine similarity between blended gradients, when the loss
    /// combines two modes.
    pub grad_alignment: Option<f64>,
}

/// Receives every loss evaluation as it happens.
pub trait LossObserver {
    fn record(&mut self, eval: &Evaluation);
}

impl<T: LossObserver> LossObserver for std::rc::Rc<std::cell::RefCell<T>> {
    fn record(&mut self, eval: &Evaluation) {
        self.borrow_mut().record(eval);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl LossObserver for NullObserver {
    fn record(&mut self, _eval: &Evaluation) {}
}

/// Keeps every evaluation, oldest first.
#[derive(Debug, Clone, Default)]
pub struct MemoryObserver {
    pub evaluations: Vec<Evaluation>,
}

impl LossObserver for MemoryObserver {
    fn record(&mut self, eval: &Evaluation) {
        self.evaluations.push(eval.clone());
    }
}
