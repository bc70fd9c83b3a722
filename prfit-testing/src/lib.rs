//! Assertion helpers shared by the test suites and benchmarks.

use assert_float_eq::*;

pub fn assert_slice_f64_relative(expected: &[f64], actual: &[f64], epsilon: f64) {
    assert_same_len(expected, actual);
    for (index, &expected) in expected.iter().enumerate() {
        let actual = actual[index];
        if actual != expected {
            assert_float_relative_eq!(expected, actual, epsilon);
        }
    }
}

/// Elementwise absolute comparison, reporting the offending index on failure.
pub fn assert_slice_f64_absolute(expected: &[f64], actual: &[f64], epsilon: f64) {
    assert_same_len(expected, actual);
    for (index, (&expected, &actual)) in expected.iter().zip(actual).enumerate() {
        assert!(
            (expected - actual).abs() <= epsilon,
            "element {index} differs: expected {expected}, got {actual} (ε = {epsilon})"
        );
    }
}

/// Asserts that two slices are identical down to the bit pattern of every element.
pub fn assert_slice_f64_bitwise(expected: &[f64], actual: &[f64]) {
    assert_same_len(expected, actual);
    for (index, (&expected, &actual)) in expected.iter().zip(actual).enumerate() {
        assert_eq!(
            expected.to_bits(),
            actual.to_bits(),
            "element {index} differs: expected {expected}, got {actual}"
        );
    }
}

fn assert_same_len(expected: &[f64], actual: &[f64]) {
    assert_eq!(
        expected.len(),
        actual.len(),
        "lengths do not match: {} ≠ {}",
        expected.len(),
        actual.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_within_epsilon() {
        assert_slice_f64_absolute(&[1.0, 2.0], &[1.05, 1.95], 0.1);
    }

    #[test]
    #[should_panic = "element 1 differs"]
    fn absolute_outside_epsilon() {
        assert_slice_f64_absolute(&[1.0, 2.0], &[1.0, 2.5], 0.1);
    }

    #[test]
    #[should_panic = "lengths do not match: 2 ≠ 1"]
    fn mismatched_lengths() {
        assert_slice_f64_relative(&[1.0, 2.0], &[1.0], 0.1);
    }

    #[test]
    fn bitwise_identical() {
        assert_slice_f64_bitwise(&[0.1 + 0.2, -0.0], &[0.1 + 0.2, -0.0]);
    }
}
