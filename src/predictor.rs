//! Linear regression from (engagement, experience) to satisfaction

use crate::error::{Error, Result};
use crate::satisfaction::SatisfactionTable;
use linfa::prelude::*;
use linfa_linear::LinearRegression;
use log::info;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Minimum training rows for a two-feature fit with intercept
const MIN_TRAIN_ROWS: usize = 3;

/// Fitted coefficients, immutable once built
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedSatisfactionModel {
    pub intercept: f64,
    pub engagement_coef: f64,
    pub experience_coef: f64,
}

impl FittedSatisfactionModel {
    pub fn predict(&self, engagement_score: f64, experience_score: f64) -> f64 {
        self.intercept
            + self.engagement_coef * engagement_score
            + self.experience_coef * experience_score
    }
}

/// Held-out evaluation of a fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub mse: f64,
    pub r2: f64,
}

#[derive(Debug, Clone)]
enum PredictorState {
    Untrained,
    Trained {
        model: FittedSatisfactionModel,
        report: RegressionReport,
    },
}

/// Satisfaction regression with an explicit Untrained -> Trained lifecycle
#[derive(Debug, Clone)]
pub struct SatisfactionPredictor {
    seed: u64,
    test_ratio: f64,
    state: PredictorState,
}

impl SatisfactionPredictor {
    /// Untrained predictor with an 80/20 split drawn from `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            test_ratio: 0.2,
            state: PredictorState::Untrained,
        }
    }

    pub fn with_test_ratio(mut self, test_ratio: f64) -> Self {
        self.test_ratio = test_ratio;
        self
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, PredictorState::Trained { .. })
    }

    pub fn model(&self) -> Option<&FittedSatisfactionModel> {
        match &self.state {
            PredictorState::Trained { model, .. } => Some(model),
            PredictorState::Untrained => None,
        }
    }

    pub fn report(&self) -> Option<&RegressionReport> {
        match &self.state {
            PredictorState::Trained { report, .. } => Some(report),
            PredictorState::Untrained => None,
        }
    }

    /// Fit ordinary least squares on a shuffled train split and evaluate on
    /// the held-out rows. Replaces any previous fit.
    pub fn fit(&mut self, table: &SatisfactionTable) -> Result<RegressionReport> {
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(Error::InvalidParameter(format!(
                "test ratio must be in (0, 1), got {}",
                self.test_ratio
            )));
        }

        let n = table.len();
        let test_rows = (n as f64 * self.test_ratio).ceil() as usize;
        let train_rows = n.saturating_sub(test_rows);
        if test_rows == 0 || train_rows < MIN_TRAIN_ROWS {
            return Err(Error::InvalidParameter(format!(
                "need at least {MIN_TRAIN_ROWS} training rows and one test row, got {n} rows"
            )));
        }

        let engagement = table.engagement_score();
        let experience = table.experience_score();
        let records = Array2::from_shape_fn((n, 2), |(row, col)| match col {
            0 => engagement[row],
            _ => experience[row],
        });
        let targets = table.satisfaction_score();

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);
        let (test_idx, train_idx) = indices.split_at(test_rows);

        let train = Dataset::new(
            records.select(Axis(0), train_idx),
            targets.select(Axis(0), train_idx),
        );
        let x_test = records.select(Axis(0), test_idx);
        let y_test = targets.select(Axis(0), test_idx);

        let fitted = LinearRegression::new().fit(&train)?;
        let predicted: Array1<f64> = fitted.predict(&x_test);
        let mse = predicted.mean_squared_error(&y_test)?;
        let r2 = predicted.r2(&y_test)?;

        let params = fitted.params();
        let model = FittedSatisfactionModel {
            intercept: fitted.intercept(),
            engagement_coef: params[0],
            experience_coef: params[1],
        };
        let report = RegressionReport {
            train_rows,
            test_rows,
            mse,
            r2,
        };

        info!(
            "Satisfaction regression: MSE {:.4}, R² {:.4} ({} train / {} test rows)",
            mse, r2, train_rows, test_rows
        );
        self.state = PredictorState::Trained { model, report };
        Ok(report)
    }

    /// Predicted satisfaction for one subscriber
    pub fn predict(&self, engagement_score: f64, experience_score: f64) -> Result<f64> {
        match &self.state {
            PredictorState::Trained { model, .. } => {
                Ok(model.predict(engagement_score, experience_score))
            }
            PredictorState::Untrained => Err(Error::NotTrained),
        }
    }
}
