use stride_nn::error::Error;
use stride_nn::{tensor, tensors::Tensor};

#[test]
fn test_tensor_creation() {
    let t = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(t.shape(), &[2, 2]);
    assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_tensor_macro() {
    let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
    assert_eq!(t.shape(), &[2, 2]);
    assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0]);

    let cube = tensor!([[[1], [2]], [[3], [4]]]);
    assert_eq!(cube.shape(), &[2, 2, 1]);
}

#[test]
fn test_tensor_shape_mismatch_panics() {
    let result = std::panic::catch_unwind(|| {
        Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0]);
    });
    assert!(result.is_err());
}

#[test]
fn test_from_vec_reports_mismatch() {
    let err = Tensor::from_vec(vec![2, 2], vec![1.0; 3]).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

#[test]
fn test_reshape_keeps_data_and_rejects_bad_counts() {
    let t = tensor!([[1, 2, 3], [4, 5, 6]]);
    let r = t.reshape(&[3, 2]).unwrap();
    assert_eq!(r.data(), t.data());
    assert!(t.reshape(&[4, 2]).is_err());
}

#[test]
fn test_update_is_all_or_nothing() {
    let mut t = Tensor::zeros(&[2, 2]);
    assert!(t.update(Tensor::ones(&[4])).is_err());
    assert_eq!(t, Tensor::zeros(&[2, 2]));
    t.update(Tensor::ones(&[2, 2])).unwrap();
    assert_eq!(t.sum(), 4.0);
}

#[test]
fn test_elementwise_ops_never_broadcast() {
    let a = tensor!([1, 2]);
    let b = tensor!([[1, 2]]);
    assert!(a.add(&b).is_err());
    assert_eq!(a.hadamard(&tensor!([3, 4])).unwrap(), tensor!([3, 8]));
    assert_eq!(&a * 2.0, tensor!([2, 4]));
}

#[test]
fn test_matmul() {
    let a = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let b = Tensor::new(vec![3, 2], vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
    let c = a.matmul(&b).unwrap();
    assert_eq!(c, tensor!([[58, 64], [139, 154]]));
    assert!(b.matmul(&b).is_err());
}

#[test]
fn test_batched_matmul_and_transpose() {
    let a = tensor!([[[1, 0], [0, 1]], [[2, 0], [0, 3]]]);
    let x = tensor!([[[5], [6]], [[5], [6]]]);
    assert_eq!(a.matmul(&x).unwrap(), tensor!([[[5], [6]], [[10], [18]]]));
    assert_eq!(x.transpose_2d().unwrap(), tensor!([[[5, 6]], [[5, 6]]]));
}

#[test]
fn test_flip_trailing() {
    let t = tensor!([[[1, 2], [3, 4]], [[5, 6], [7, 8]]]);
    assert_eq!(t.flip_trailing(2).unwrap(), tensor!([[[4, 3], [2, 1]], [[8, 7], [6, 5]]]));
    assert_eq!(t.flip_trailing(1).unwrap(), tensor!([[[2, 1], [4, 3]], [[6, 5], [8, 7]]]));
    assert!(t.flip_trailing(4).is_err());
}

#[test]
fn test_stack_and_index() {
    let parts = [tensor!([1, 2]), tensor!([3, 4]), tensor!([5, 6])];
    let s = Tensor::stack(&parts).unwrap();
    assert!(Tensor::stack(&[tensor!([1, 2]), tensor!([1])]).is_err());
    assert_eq!(s.shape(), &[3, 2]);
    assert_eq!(s.index_axis0(1).unwrap(), parts[1]);
    assert!(s.index_axis0(3).is_err());
}

#[test]
fn test_argmax_prefers_first_maximum() {
    assert_eq!(tensor!([1, 7, 7, 2]).argmax(), Some(1));
    assert_eq!(Tensor::empty().argmax(), None);
}
