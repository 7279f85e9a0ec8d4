//! Случайный лес для классификации уровня стресса
//!
//! Bootstrap-выборки, случайное подмножество признаков в каждом узле,
//! разбиения по критерию Джини. Вероятность класса - среднее распределений
//! листьев по всем деревьям.

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StressError};

/// Веса классов при обучении
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    Uniform,
    /// n_samples / (n_classes * count(class))
    Balanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub class_weight: ClassWeight,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: Some(15),
            min_samples_split: 5,
            min_samples_leaf: 2,
            class_weight: ClassWeight::Balanced,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn without_class_balancing(mut self) -> Self {
        self.class_weight = ClassWeight::Uniform;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(StressError::InvalidParameter("n_trees must be positive".to_string()));
        }
        if self.min_samples_split < 2 {
            return Err(StressError::InvalidParameter(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(StressError::InvalidParameter(
                "min_samples_leaf must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    root: TreeNode,
    /// Нормированное уменьшение неоднородности по признакам
    importances: Vec<f64>,
}

impl TreeNode {
    fn is_finite(&self) -> bool {
        match self {
            TreeNode::Leaf { distribution } => distribution.iter().all(|p| p.is_finite()),
            TreeNode::Split {
                threshold,
                left,
                right,
                ..
            } => threshold.is_finite() && left.is_finite() && right.is_finite(),
        }
    }
}

impl DecisionTree {
    fn leaf_distribution(&self, sample: ArrayView1<f64>) -> &[f64] {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { distribution } => return distribution,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Построение одного дерева: общие для узлов данные и счётчик важностей
struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a [usize],
    weights: Vec<f64>,
    params: &'a ForestParams,
    n_classes: usize,
    max_features: usize,
    importances: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    child_impurity: f64,
}

impl<'a> TreeBuilder<'a> {
    fn build(mut self, rng: &mut StdRng) -> DecisionTree {
        let samples: Vec<usize> = (0..self.x.nrows()).filter(|&i| self.weights[i] > 0.0).collect();
        let root = self.grow(samples, 0, rng);

        let total: f64 = self.importances.iter().sum();
        if total > 0.0 {
            self.importances.iter_mut().for_each(|v| *v /= total);
        }

        DecisionTree {
            root,
            importances: self.importances,
        }
    }

    fn class_totals(&self, samples: &[usize]) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_classes];
        for &i in samples {
            totals[self.y[i]] += self.weights[i];
        }
        totals
    }

    fn leaf(&self, totals: Vec<f64>) -> TreeNode {
        let sum: f64 = totals.iter().sum();
        let distribution = if sum > 0.0 {
            totals.into_iter().map(|w| w / sum).collect()
        } else {
            vec![1.0 / self.n_classes as f64; self.n_classes]
        };
        TreeNode::Leaf { distribution }
    }

    fn grow(&mut self, samples: Vec<usize>, depth: usize, rng: &mut StdRng) -> TreeNode {
        let totals = self.class_totals(&samples);
        let weight: f64 = totals.iter().sum();
        let impurity = gini(&totals, weight);

        let depth_reached = self.params.max_depth.map_or(false, |max| depth >= max);
        if depth_reached
            || samples.len() < self.params.min_samples_split
            || samples.len() < 2 * self.params.min_samples_leaf
            || impurity <= 1e-12
        {
            return self.leaf(totals);
        }

        let Some(best) = self.find_split(&samples, rng) else {
            return self.leaf(totals);
        };

        self.importances[best.feature] += weight * impurity - best.child_impurity;

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| self.x[[i, best.feature]] <= best.threshold);

        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.grow(left, depth + 1, rng)),
            right: Box::new(self.grow(right, depth + 1, rng)),
        }
    }

    /// Перебирает признаки в случайном порядке, пока не рассмотрит
    /// `max_features` непостоянных
    fn find_split(&self, samples: &[usize], rng: &mut StdRng) -> Option<BestSplit> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(rng);

        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<BestSplit> = None;
        let mut visited = 0;

        for feature in features {
            if visited >= self.max_features {
                break;
            }

            let mut order = samples.to_vec();
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let first = self.x[[order[0], feature]];
            let last = self.x[[order[order.len() - 1], feature]];
            if first >= last {
                continue;
            }
            visited += 1;

            let mut left = vec![0.0; self.n_classes];
            let mut right = self.class_totals(&order);

            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left[self.y[i]] += self.weights[i];
                right[self.y[i]] -= self.weights[i];

                let current = self.x[[i, feature]];
                let next = self.x[[order[pos + 1], feature]];
                if next <= current {
                    continue;
                }

                let n_left = pos + 1;
                if n_left < min_leaf || order.len() - n_left < min_leaf {
                    continue;
                }

                let w_left: f64 = left.iter().sum();
                let w_right: f64 = right.iter().sum();
                if w_left <= 0.0 || w_right <= 0.0 {
                    continue;
                }

                let child_impurity = w_left * gini(&left, w_left) + w_right * gini(&right, w_right);
                if best
                    .as_ref()
                    .map_or(true, |b| child_impurity < b.child_impurity)
                {
                    let mut threshold = (current + next) / 2.0;
                    if threshold >= next {
                        threshold = current;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        child_impurity,
                    });
                }
            }
        }

        best
    }
}

fn gini(totals: &[f64], weight: f64) -> f64 {
    if weight <= 0.0 {
        return 0.0;
    }
    1.0 - totals.iter().map(|w| (w / weight).powi(2)).sum::<f64>()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Обучает лес на матрице `x` и кодах классов `y` (0..n_classes)
    pub fn fit(x: &Array2<f64>, y: &[usize], n_classes: usize, params: &ForestParams) -> Result<Self> {
        params.validate()?;

        let n_samples = x.nrows();
        if n_samples == 0 || x.ncols() == 0 {
            return Err(StressError::InsufficientData("Empty dataset".to_string()));
        }
        if y.len() != n_samples {
            return Err(StressError::InvalidParameter(format!(
                "{} samples but {} labels",
                n_samples,
                y.len()
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(StressError::InvalidParameter(
                "features contain NaN or infinite values".to_string(),
            ));
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(StressError::InvalidParameter(format!(
                "class code {} out of range 0..{}",
                bad, n_classes
            )));
        }

        let class_weights = class_weights(y, n_classes, params.class_weight);
        let max_features = ((x.ncols() as f64).sqrt() as usize).max(1);

        let mut master = StdRng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.n_trees).map(|_| master.gen()).collect();

        let trees: Vec<DecisionTree> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let weights = sample_weights(y, &class_weights, params.bootstrap, &mut rng);
                TreeBuilder {
                    x,
                    y,
                    weights,
                    params,
                    n_classes,
                    max_features,
                    importances: vec![0.0; x.ncols()],
                }
                .build(&mut rng)
            })
            .collect();

        let mut feature_importances = vec![0.0; x.ncols()];
        for tree in &trees {
            for (acc, v) in feature_importances.iter_mut().zip(&tree.importances) {
                *acc += v;
            }
        }
        let total: f64 = feature_importances.iter().sum();
        if total > 0.0 {
            feature_importances.iter_mut().for_each(|v| *v /= total);
        }

        tracing::debug!(
            "Random forest fitted: {} trees, {} samples, {} features",
            trees.len(),
            n_samples,
            x.ncols()
        );

        Ok(Self {
            params: params.clone(),
            n_features: x.ncols(),
            n_classes,
            trees,
            feature_importances,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Все пороги, распределения листьев и важности - конечные числа
    pub fn is_finite(&self) -> bool {
        self.feature_importances.iter().all(|v| v.is_finite())
            && self.trees.iter().all(|tree| tree.root.is_finite())
    }

    /// Важности признаков (сумма = 1, если лес хоть раз ветвился)
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Матрица n_samples x n_classes, строки суммируются в 1
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(StressError::Inference(format!(
                "model expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        if self.trees.is_empty() {
            return Err(StressError::Inference("model has no trees".to_string()));
        }

        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, sample) in x.rows().into_iter().enumerate() {
            for tree in &self.trees {
                for (c, p) in tree.leaf_distribution(sample).iter().enumerate() {
                    proba[[i, c]] += p;
                }
            }
        }
        proba.mapv_inplace(|p| p / self.trees.len() as f64);

        Ok(proba)
    }

    /// Класс с максимальной вероятностью (при равенстве - меньший индекс)
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| argmax(row)).collect())
    }
}

pub(crate) fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn class_weights(y: &[usize], n_classes: usize, mode: ClassWeight) -> Vec<f64> {
    match mode {
        ClassWeight::Uniform => vec![1.0; n_classes],
        ClassWeight::Balanced => {
            let mut counts = vec![0usize; n_classes];
            for &c in y {
                counts[c] += 1;
            }
            let present = counts.iter().filter(|&&c| c > 0).count().max(1);
            counts
                .iter()
                .map(|&count| {
                    if count == 0 {
                        0.0
                    } else {
                        y.len() as f64 / (present * count) as f64
                    }
                })
                .collect()
        }
    }
}

/// Вес примера = вес класса * число попаданий в bootstrap-выборку
fn sample_weights(y: &[usize], class_weights: &[f64], bootstrap: bool, rng: &mut StdRng) -> Vec<f64> {
    let n = y.len();
    let mut counts = vec![if bootstrap { 0.0 } else { 1.0 }; n];
    if bootstrap {
        for _ in 0..n {
            counts[rng.gen_range(0..n)] += 1.0;
        }
    }
    counts
        .iter()
        .zip(y)
        .map(|(count, &c)| count * class_weights[c])
        .collect()
}
