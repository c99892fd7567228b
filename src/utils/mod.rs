pub mod validation;

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

pub fn normalize_vector(vector: &mut [f64]) {
    let norm: f64 = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Weighted average of equally-sized vectors. Weights may be negative
/// (dismissals); if the total weight is not positive the result is the zero
/// vector, which downstream scoring treats as "no profile".
pub fn weighted_average(vectors: &[(&[f64], f64)], dim: usize) -> Vec<f64> {
    let mut result = vec![0.0; dim];
    let mut total_weight = 0.0;

    for (vector, weight) in vectors {
        if vector.len() != dim {
            continue;
        }
        for i in 0..dim {
            result[i] += vector[i] * weight;
        }
        total_weight += weight;
    }

    if total_weight > 0.0 {
        for x in result.iter_mut() {
            *x /= total_weight;
        }
    } else {
        result.iter_mut().for_each(|x| *x = 0.0);
    }

    result
}

pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p) * (a - p))
        .sum::<f64>()
        / actual.len() as f64
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}
