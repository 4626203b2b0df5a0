use criterion::{criterion_group, criterion_main, Criterion};

use cad_kernel::geom::{pnt, vec3};
use cad_kernel::primitives::box_solid;
use cad_kernel::Shape;

use cad_graph::TopoMaps;

fn grid_of_boxes(n: usize) -> Shape {
    let mut parts = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let solid = box_solid(
                pnt(3.0 * i as f64, 3.0 * j as f64, 0.0),
                vec3(1.0, 0.0, 0.0),
                vec3(0.0, 1.0, 0.0),
                vec3(0.0, 0.0, 1.0),
            )
            .unwrap();
            parts.push(Shape::Solid(solid));
        }
    }
    Shape::Compound(parts)
}

fn bench_naming(c: &mut Criterion) {
    let small = grid_of_boxes(2);
    let large = grid_of_boxes(5);
    c.bench_function("name_entities_4_boxes", |b| {
        b.iter(|| TopoMaps::from_shape(std::hint::black_box(&small)))
    });
    c.bench_function("name_entities_25_boxes", |b| {
        b.iter(|| TopoMaps::from_shape(std::hint::black_box(&large)))
    });
}

criterion_group!(benches, bench_naming);
criterion_main!(benches);
