use std::fs::{read_to_string, File};
use std::io::{BufWriter, ErrorKind};
use std::path::Path;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::metrics::accuracy;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters,
};

use crate::error::{HeartRiskError, Result};

/// A pre-trained binary classifier over encoded feature vectors.
pub trait Classifier {
    /// Encoded column names, in the order the model was trained on.
    fn feature_names(&self) -> &[String];

    fn n_features(&self) -> usize {
        self.feature_names().len()
    }

    /// 0 = no heart disease, 1 = heart disease.
    fn predict(&self, features: &[f64]) -> Result<u8>;

    /// (P(class 0), P(class 1)).
    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]>;
}

type Tree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestParameters {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParameters {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 10,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

/// Bootstrap-aggregated decision trees. The class-1 probability is the share
/// of trees voting 1.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForestModel {
    feature_names: Vec<String>,
    /// Column count of the training matrix.
    n_features: usize,
    trees: Vec<Tree>,
}

fn to_matrix(rows: &[Vec<f64>], ncols: usize) -> DenseMatrix<f64> {
    let values: Vec<f64> = rows.iter().flat_map(|row| row.iter().copied()).collect();
    DenseMatrix::new(rows.len(), ncols, values, false)
}

impl ForestModel {
    pub fn fit(
        feature_names: Vec<String>,
        x: &[Vec<f64>],
        y: &[i32],
        params: ForestParameters,
    ) -> Result<Self> {
        if params.n_trees == 0 {
            return Err(HeartRiskError::EmptyModel);
        }
        if let Some(label) = y.first() {
            if y.iter().all(|l| l == label) {
                return Err(HeartRiskError::SingleClass { label: *label });
            }
        }
        if let Some(row) = x.iter().find(|row| row.len() != feature_names.len()) {
            return Err(HeartRiskError::DimensionMismatch {
                expected: feature_names.len(),
                actual: row.len(),
            });
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let tree_params = DecisionTreeClassifierParameters::default()
            .with_max_depth(params.max_depth)
            .with_min_samples_leaf(params.min_samples_leaf);

        let mut trees = Vec::with_capacity(params.n_trees);
        for i in 0..params.n_trees {
            /* draw a bootstrap sample with replacement */
            let picks: Vec<usize> = (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect();
            let xs: Vec<Vec<f64>> = picks.iter().map(|&p| x[p].clone()).collect();
            let ys: Vec<i32> = picks.iter().map(|&p| y[p]).collect();

            let tree = Tree::fit(&to_matrix(&xs, feature_names.len()), &ys, tree_params.clone())?;
            debug!("fitted tree {} of {}", i + 1, params.n_trees);
            trees.push(tree);
        }

        let model = Self {
            n_features: feature_names.len(),
            feature_names,
            trees,
        };
        let predicted = model.predict_rows(x)?;
        info!(
            "trained {} trees, training accuracy {:.4}",
            model.trees.len(),
            accuracy(&y.to_vec(), &predicted)
        );
        Ok(model)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => HeartRiskError::ModelNotFound {
                path: path.to_path_buf(),
            },
            _ => e.into(),
        })?;
        let model: Self = serde_json::from_str(&text)?;
        if model.trees.is_empty() {
            return Err(HeartRiskError::EmptyModel);
        }
        if model.feature_names.len() != model.n_features {
            return Err(HeartRiskError::DimensionMismatch {
                expected: model.n_features,
                actual: model.feature_names.len(),
            });
        }
        info!(
            "loaded model {:?}: {} trees over {} features",
            path,
            model.trees.len(),
            model.n_features()
        );
        Ok(model)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of trees voting for class 1, per row.
    fn votes(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>> {
        let matrix = to_matrix(rows, self.n_features());
        let mut votes = vec![0usize; rows.len()];
        for tree in &self.trees {
            for (vote, label) in votes.iter_mut().zip(tree.predict(&matrix)?) {
                if label == 1 {
                    *vote += 1;
                }
            }
        }
        Ok(votes)
    }

    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<i32>> {
        let n_trees = self.trees.len();
        Ok(self
            .votes(rows)?
            .into_iter()
            // argmax over (P0, P1), ties go to class 0
            .map(|v| if 2 * v > n_trees { 1 } else { 0 })
            .collect())
    }

    fn check_width(&self, features: &[f64]) -> Result<()> {
        if features.len() != self.n_features() {
            return Err(HeartRiskError::DimensionMismatch {
                expected: self.n_features(),
                actual: features.len(),
            });
        }
        Ok(())
    }
}

impl Classifier for ForestModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f64]) -> Result<u8> {
        self.check_width(features)?;
        let label = self.predict_rows(&[features.to_vec()])?;
        Ok(label[0] as u8)
    }

    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]> {
        self.check_width(features)?;
        let votes = self.votes(&[features.to_vec()])?;
        let p1 = votes[0] as f64 / self.trees.len() as f64;
        Ok([1.0 - p1, p1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_data() -> (Vec<String>, Vec<Vec<f64>>, Vec<i32>) {
        let names = vec!["a".to_string(), "b".to_string()];
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..40 {
            let a = i as f64 / 10.0;
            x.push(vec![a, (i % 3) as f64]);
            y.push(if a >= 2.0 { 1 } else { 0 });
        }
        (names, x, y)
    }

    fn params() -> ForestParameters {
        ForestParameters {
            n_trees: 7,
            max_depth: 4,
            ..ForestParameters::default()
        }
    }

    #[test]
    fn forest_separates_a_threshold() {
        let (names, x, y) = toy_data();
        let model = ForestModel::fit(names, &x, &y, params()).unwrap();

        assert_eq!(model.n_trees(), 7);
        assert_eq!(model.predict(&[0.1, 1.0]).unwrap(), 0);
        assert_eq!(model.predict(&[3.8, 1.0]).unwrap(), 1);

        let [p0, p1] = model.predict_proba(&[3.8, 1.0]).unwrap();
        assert!((p0 + p1 - 1.0).abs() < 1e-12);
        assert!(p1 > 0.5);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let (names, x, y) = toy_data();
        let model = ForestModel::fit(names, &x, &y, params()).unwrap();

        let err = model.predict(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            HeartRiskError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn single_class_is_rejected() {
        let (names, x, _) = toy_data();
        let y = vec![0; x.len()];
        assert!(matches!(
            ForestModel::fit(names, &x, &y, params()),
            Err(HeartRiskError::SingleClass { label: 0 })
        ));
    }

    #[test]
    fn reloaded_model_predicts_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rf_model.json");
        let (names, x, y) = toy_data();
        ForestModel::fit(names, &x, &y, params())
            .unwrap()
            .save(&path)
            .unwrap();

        let first = ForestModel::load(&path).unwrap();
        let second = ForestModel::load(&path).unwrap();
        for row in &x {
            assert_eq!(first.predict(row).unwrap(), second.predict(row).unwrap());
            assert_eq!(
                first.predict_proba(row).unwrap(),
                second.predict_proba(row).unwrap()
            );
        }
        assert_eq!(first.feature_names(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn zero_trees_are_rejected() {
        let (names, x, y) = toy_data();
        let params = ForestParameters {
            n_trees: 0,
            ..params()
        };
        assert!(matches!(
            ForestModel::fit(names, &x, &y, params),
            Err(HeartRiskError::EmptyModel)
        ));
    }

    #[test]
    fn artifact_with_inconsistent_width_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rf_model.json");
        let (names, x, y) = toy_data();
        ForestModel::fit(names, &x, &y, params())
            .unwrap()
            .save(&path)
            .unwrap();

        let mut artifact: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        artifact["feature_names"] = serde_json::json!(["a"]);
        std::fs::write(&path, artifact.to_string()).unwrap();

        let err = ForestModel::load(&path).unwrap_err();
        assert!(matches!(
            err,
            HeartRiskError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn missing_artifact_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = ForestModel::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, HeartRiskError::ModelNotFound { .. }));
    }
}
