use proptest::prelude::*;
use stride_nn::backprop::clip_norm_2d;
use stride_nn::ops::{correlate, correlate_shape, dilate, pool_argmax};
use stride_nn::{Real, Tensor};

fn column_norms(t: &Tensor) -> Vec<Real> {
    let (c, l) = (t.shape()[0], t.shape()[1]);
    (0..c)
        .map(|ch| t.data()[ch * l..(ch + 1) * l].iter().map(|v| v * v).sum::<Real>().sqrt())
        .collect()
}

proptest! {
    #[test]
    fn test_clipped_columns_never_exceed_threshold(
        values in prop::collection::vec(-100.0f64..100.0, 12),
        threshold in 0.01f64..50.0,
    ) {
        let delta = Tensor::new(vec![3, 4, 1], values);
        let clipped = clip_norm_2d(&delta, threshold);
        for (before, after) in column_norms(&delta).into_iter().zip(column_norms(&clipped)) {
            if before >= threshold {
                prop_assert!((after - threshold).abs() <= 1e-9 * threshold.max(1.0));
            } else {
                prop_assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn test_correlate_output_matches_shape_rule(
        (h, w, kh, kw) in (1usize..8, 1usize..8).prop_flat_map(|(h, w)| (Just(h), Just(w), 1..=h, 1..=w)),
        sh in 1usize..4,
        sw in 1usize..4,
    ) {
        let matrix = Tensor::new(vec![h, w], (0..h * w).map(|v| v as Real).collect());
        let kernel = Tensor::ones(&[kh, kw]);
        let out = correlate(&matrix, &kernel, &[sh, sw], None).unwrap();
        let expected = correlate_shape(&[h, w], &[kh, kw], &[sh, sw]).unwrap();
        prop_assert_eq!(out.shape(), expected.as_slice());
        prop_assert_eq!(expected, vec![(h - kh) / sh + 1, (w - kw) / sw + 1]);
        // top-left window sum
        let corner: Real = (0..kh).flat_map(|r| (0..kw).map(move |c| (r * w + c) as Real)).sum();
        prop_assert_eq!(out.data()[0], corner);
    }

    #[test]
    fn test_unit_kernel_is_identity(values in prop::collection::vec(-10.0f64..10.0, 1..20)) {
        let n = values.len();
        let matrix = Tensor::new(vec![n], values);
        let out = correlate(&matrix, &Tensor::ones(&[1]), &[1], None).unwrap();
        prop_assert_eq!(out, matrix);
    }

    #[test]
    fn test_dilation_keeps_every_value(
        values in prop::collection::vec(-10.0f64..10.0, 6),
        stride in 1usize..4,
        pad in 0usize..3,
    ) {
        let matrix = Tensor::new(vec![2, 3], values);
        let dilated = dilate(&matrix, &[stride, stride], &[pad, pad]).unwrap();
        prop_assert_eq!(dilated.shape(), &[pad * 2 + stride + 1, pad * 2 + 2 * stride + 1][..]);
        prop_assert_eq!(dilated.sum(), matrix.sum());
    }

    #[test]
    fn test_pool_routes_point_at_window_maxima(values in prop::collection::vec(-10.0f64..10.0, 16)) {
        let matrix = Tensor::new(vec![4, 4], values);
        let (pooled, routes) = pool_argmax(&matrix, &[2, 2], &[2, 2]).unwrap();
        prop_assert_eq!(routes.len(), pooled.len());
        for (&r, &v) in routes.iter().zip(pooled.data()) {
            prop_assert_eq!(matrix.data()[r], v);
        }
    }
}
