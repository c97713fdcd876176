//! Tiny helpers for 3-component vectors stored as plain arrays

/// Positions, displacements and lines of sight are all stored like this
pub type Vec3 = [f64; 3];

/// squared euclidean norm
pub fn squared_norm(v: &Vec3) -> f64 {
    let mut sum = 0.0;
    for comp in v {
        sum += comp * comp;
    }
    sum
}

/// euclidean norm
pub fn norm(v: &Vec3) -> f64 {
    squared_norm(v).sqrt()
}

/// largest component
pub fn max_component(v: &Vec3) -> f64 {
    v[0].max(v[1]).max(v[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norms() {
        assert_eq!(squared_norm(&[3.0, 4.0, 0.0]), 25.0);
        assert_eq!(norm(&[3.0, 4.0, 0.0]), 5.0);
        assert_eq!(norm(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn largest_component() {
        assert_eq!(max_component(&[1.0, 7.0, 3.0]), 7.0);
        assert_eq!(max_component(&[-1.0, -7.0, -3.0]), -1.0);
    }
}
