use serde::Deserialize;

fn default_missing_left() -> bool {
    true
}

/// One node of a flat tree. Split children always point forward.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Node<L> {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default = "default_missing_left")]
        missing_left: bool,
    },
    Leaf {
        leaf: L,
    },
}

/// Binary decision tree stored as a node array rooted at index 0.
#[derive(Debug, Clone, Deserialize)]
pub struct Tree<L> {
    nodes: Vec<Node<L>>,
}

impl<L> Tree<L> {
    #[cfg(test)]
    pub fn from_nodes(nodes: Vec<Node<L>>) -> Self {
        Self { nodes }
    }

    /// Checks that every walk from the root terminates at a leaf and reads
    /// only features below `n_features`. `check_leaf` vets leaf payloads.
    pub fn validate<F>(&self, n_features: usize, check_leaf: F) -> Result<(), String>
    where
        F: Fn(&L) -> Result<(), String>,
    {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let len = self.nodes.len();
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {index} splits on feature {feature}, model has {n_features}"
                        ));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {index} has a NaN threshold"));
                    }
                    for child in [*left, *right] {
                        if child <= index || child >= len {
                            return Err(format!(
                                "node {index} points to invalid child {child} (tree has {len} nodes)"
                            ));
                        }
                    }
                }
                Node::Leaf { leaf } => {
                    check_leaf(leaf).map_err(|reason| format!("leaf {index}: {reason}"))?;
                }
            }
        }
        Ok(())
    }

    /// Walks `row` down to its leaf. `x <= threshold` goes left, NaN follows `missing_left`.
    pub fn leaf(&self, row: &[f64]) -> &L {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { leaf } => return leaf,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    missing_left,
                } => {
                    let value = row[*feature];
                    let go_left = if value.is_nan() {
                        *missing_left
                    } else {
                        value <= *threshold
                    };
                    index = if go_left { *left } else { *right };
                }
            }
        }
    }
}
