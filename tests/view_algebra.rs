use approx::assert_relative_eq;
use blockwise::{DenseArray, Extension, Interval, VirtualArray};
use blockwise_view::{add, center_gradient, center_gradient_on_interval, div, mul, sub};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_view(rng: &mut StdRng, dims: &[i64], low: f64, high: f64) -> VirtualArray<f64> {
    let interval = Interval::from_dimensions(dims).unwrap();
    VirtualArray::from_source(DenseArray::from_fn(interval, |_| rng.gen_range(low..high)))
}

#[test]
fn test_inverse_operation_round_trips() {
    let mut rng = StdRng::seed_from_u64(42);
    let dims = [7, 5, 3];
    let a = random_view(&mut rng, &dims, -10.0, 10.0);
    let b = random_view(&mut rng, &dims, 0.5, 4.0);

    let added = sub(&add(&a, &b).unwrap(), &b).unwrap();
    let multiplied = div(&mul(&a, &b).unwrap(), &b).unwrap();

    for p in Interval::from_dimensions(&dims).unwrap().positions() {
        let expected = a.get(&p).unwrap();
        assert_relative_eq!(added.get(&p).unwrap(), expected, epsilon = 1e-10);
        assert_relative_eq!(multiplied.get(&p).unwrap(), expected, epsilon = 1e-10);
    }
}

#[test]
fn test_gradient_of_ramp_is_constant_on_every_axis() {
    let dims = [6, 5, 4];
    let slopes = [0.5, -2.0, 3.25];
    let interval = Interval::from_dimensions(&dims).unwrap();
    let view = VirtualArray::from_source(DenseArray::from_fn(interval, |p| {
        p.iter().zip(&slopes).map(|(&x, &k)| k * x as f64).sum::<f64>()
    }))
    .extend(Extension::Zero)
    .unwrap();

    for (axis, &k) in slopes.iter().enumerate() {
        let gradient = center_gradient(&view, axis).unwrap();
        let mut min = vec![0; 3];
        let mut max: Vec<i64> = dims.iter().map(|&d| d - 1).collect();
        min[axis] = 1;
        max[axis] -= 1;
        let interior = Interval::new(min, max).unwrap();
        for p in interior.positions() {
            assert_relative_eq!(gradient.get(&p).unwrap(), k, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_gradient_on_interval_mirrors_boundaries() {
    let interval = Interval::from_dimensions(&[10]).unwrap();
    let view = VirtualArray::from_source(DenseArray::from_fn(interval.clone(), |p| p[0] as f64));
    let gradient = center_gradient_on_interval(&view, 0, &interval).unwrap();

    assert_eq!(gradient.bounds(), Some(interval.clone()));
    let values = gradient.materialize(&interval).unwrap();
    assert_eq!(
        values.data(),
        &[0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0]
    );
}

#[test]
fn test_gradient_on_translated_interval() {
    let interval = Interval::new(vec![100, -4], vec![109, 3]).unwrap();
    let view = VirtualArray::from_source(DenseArray::from_fn(interval.clone(), |p| {
        (p[1] * p[1]) as f64
    }));
    let gradient = center_gradient_on_interval(&view, 1, &interval).unwrap();
    // (v(y + 1) - v(y - 1)) / 2 = 2y
    for y in -3..=2 {
        assert_relative_eq!(gradient.get(&[104, y]).unwrap(), 2.0 * y as f64);
    }
    // mirrored at both ends
    assert_relative_eq!(gradient.get(&[104, -4]).unwrap(), 0.0);
    assert_relative_eq!(gradient.get(&[104, 3]).unwrap(), 0.0);
}

#[test]
fn test_deep_composition_stays_lazy() {
    let interval = Interval::from_dimensions(&[32, 8]).unwrap();
    let base = VirtualArray::from_source(DenseArray::from_fn(interval.clone(), |p| {
        (p[0] * 32 + p[1]) as f64
    }));
    let mut view = base.clone();
    for _ in 0..8 {
        let extended = view.extend(Extension::MirrorSingle).unwrap();
        let gradient = center_gradient(&extended, 0).unwrap();
        view = add(&view, &gradient)
            .unwrap()
            .restrict_to_interval(&interval)
            .unwrap();
    }
    // Away from the mirrored ends every level adds the constant slope 32.
    let value = view.get(&[16, 3]).unwrap();
    let expected = base.get(&[16, 3]).unwrap() + 8.0 * 32.0;
    assert_relative_eq!(value, expected, max_relative = 1e-12);
}

#[test]
fn test_boundary_policies() {
    let interval = Interval::from_dimensions(&[4]).unwrap();
    let view = VirtualArray::from_source(DenseArray::from_fn(interval, |p| (p[0] + 1) as i32));
    let read = |policy: Extension, x: i64| view.extend(policy).unwrap().get(&[x]).unwrap();

    assert_eq!(read(Extension::Zero, -1), 0);
    assert_eq!(read(Extension::Border, -3), 1);
    assert_eq!(read(Extension::MirrorSingle, -1), 2);
    assert_eq!(read(Extension::MirrorDouble, -1), 1);
    assert_eq!(read(Extension::Periodic, 5), 2);
}
