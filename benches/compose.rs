use criterion::{criterion_group, criterion_main, Criterion, black_box};

use std::path::Path;

use scenecomp::author::resolve_transform;
use scenecomp::compose::Stage;
use scenecomp::document::{
    Document, DocumentStore, MemoryStore, NodePath, Reference, TimeCode, UpAxis, Value,
};

fn path(s: &str) -> NodePath {
    NodePath::parse(s).unwrap()
}

/// An asset with a small hierarchy and a root document referencing it `count` times.
fn build_scene(count: usize) -> (MemoryStore, Document) {
    let store = MemoryStore::new();

    let mut asset = Document::new(UpAxis::Y, 1.0);
    let model = path("/Model");
    asset.define_node(&model, Some("Xform")).unwrap();
    for i in 0..16 {
        let part = model.child(&format!("Part_{}", i)).unwrap();
        asset.define_node(&part, Some("Cube")).unwrap();
        let opinions = asset.author(&part).unwrap();
        opinions
            .set_attribute("xformOp:translate", Value::Double3([i as f64, 0.0, 0.0]), TimeCode::Default)
            .unwrap();
        opinions.xform_op_order = Some(vec!["xformOp:translate".into()]);
    }
    asset.default_node = Some(model.clone());
    store.save_document(&asset, Path::new("/bench/asset.sdoc")).unwrap();

    let mut root = Document::new(UpAxis::Y, 1.0);
    for i in 0..count {
        let node = path(&format!("/World/Item_{}", i));
        root.define_node(&node, Some("Xform")).unwrap();
        let opinions = root.author(&node).unwrap();
        opinions.add_reference(Reference::new("asset.sdoc", Some(model.clone())));
        opinions
            .set_attribute("xformOp:translate", Value::Double3([0.0, 0.0, i as f64]), TimeCode::Default)
            .unwrap();
        opinions.xform_op_order = Some(vec!["xformOp:translate".into()]);
    }
    store.save_document(&root, Path::new("/bench/root.sdoc")).unwrap();
    let root = store.load_document(Path::new("/bench/root.sdoc")).unwrap();
    (store, root)
}

fn bench_compose(c: &mut Criterion) {
    let (store, root) = build_scene(64);

    c.bench_function("compose_64_refs", |b| {
        b.iter(|| {
            let stage = Stage::compose(black_box(&root), &store);
            stage.descendants(&NodePath::root(), None).len()
        });
    });
}

fn bench_resolve_transform(c: &mut Criterion) {
    let (store, root) = build_scene(64);
    let stage = Stage::compose(&root, &store);
    let target = path("/World/Item_32/Part_7");

    c.bench_function("resolve_transform_nested", |b| {
        b.iter(|| resolve_transform(&stage, black_box(&target), TimeCode::Default).unwrap());
    });
}

fn bench_flatten(c: &mut Criterion) {
    let (store, root) = build_scene(16);
    let stage = Stage::compose(&root, &store);

    c.bench_function("flatten_16_refs", |b| {
        b.iter(|| stage.flatten());
    });
}

criterion_group!(benches, bench_compose, bench_resolve_transform, bench_flatten);
criterion_main!(benches);
