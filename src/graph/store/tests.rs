use super::*;
use serde_json::json;
use tempfile::tempdir;

fn props(pairs: &[(&str, serde_json::Value)]) -> PropertyMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_basic_operations() {
    let store = GraphStore::in_memory();

    let ns = store
        .add_vertex(VertexLabel::Namespace, props(&[("name", json!("ns1"))]))
        .unwrap();
    let pod = store
        .add_vertex(
            VertexLabel::Pod,
            props(&[("name", json!("p1")), ("namespace", json!("ns1"))]),
        )
        .unwrap();

    assert_ne!(ns, pod);
    assert_eq!(store.node_count(), 2);

    let pods = store
        .query_vertices(&VertexFilter::label(VertexLabel::Pod))
        .unwrap();
    assert_eq!(pods.len(), 1);
    assert_eq!(pods[0].name(), Some("p1"));

    let by_ns = store
        .query_vertices(&VertexFilter::all().has("namespace", "ns1"))
        .unwrap();
    assert_eq!(by_ns.len(), 1, "namespace vertex has no namespace property");

    let fetched = store.vertex(ns).unwrap().expect("namespace vertex");
    assert_eq!(fetched.label, VertexLabel::Namespace);
}

#[test]
fn test_edges() {
    let store = GraphStore::in_memory();

    let a = store.add_vertex(VertexLabel::Service, PropertyMap::new()).unwrap();
    let b = store.add_vertex(VertexLabel::Pod, PropertyMap::new()).unwrap();
    let c = store.add_vertex(VertexLabel::Pod, PropertyMap::new()).unwrap();

    let relationship = props(&[("relationship", json!("service_exposes_pod"))]);
    store.add_edge(a, b, EdgeLabel::Exposes, relationship).unwrap();
    store.add_edge(a, c, EdgeLabel::Exposes, PropertyMap::new()).unwrap();
    store.add_edge(c, b, EdgeLabel::Manages, PropertyMap::new()).unwrap();

    assert_eq!(store.edge_count(), 3);
    assert_eq!(store.query_edges(&EdgeFilter::outgoing(a)).unwrap().len(), 2);
    assert_eq!(store.query_edges(&EdgeFilter::incoming(b)).unwrap().len(), 2);
    assert_eq!(store.query_edges(&EdgeFilter::incident(c)).unwrap().len(), 2);
    assert_eq!(
        store
            .query_edges(&EdgeFilter::label(EdgeLabel::Manages))
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        store
            .count_edges(&EdgeFilter::all().has("relationship", "service_exposes_pod"))
            .unwrap(),
        1
    );

    // Results come back in id order regardless of adjacency order
    let out = store.query_edges(&EdgeFilter::outgoing(a)).unwrap();
    assert!(out[0].id < out[1].id);

    let limited = store.query_edges(&EdgeFilter::incident(b).limit(1)).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn test_edge_to_unknown_vertex_fails() {
    let store = GraphStore::in_memory();
    let a = store.add_vertex(VertexLabel::Pod, PropertyMap::new()).unwrap();

    let err = store
        .add_edge(a, VertexId(999), EdgeLabel::Contains, PropertyMap::new())
        .unwrap_err();
    assert!(matches!(err, GraphError::Operation { ref op, .. } if op == "add_edge"));
}

#[test]
fn test_set_vertex_property() {
    let store = GraphStore::in_memory();
    let pod = store.add_vertex(VertexLabel::Pod, PropertyMap::new()).unwrap();

    store.set_vertex_property(pod, "risk_level", json!("high")).unwrap();
    let high = store
        .query_vertices(&VertexFilter::all().has("risk_level", "high"))
        .unwrap();
    assert_eq!(high.len(), 1);

    assert!(store
        .set_vertex_property(VertexId(42), "risk_level", json!("high"))
        .is_err());
}

#[test]
fn test_clear_keeps_ids_fresh() {
    let store = GraphStore::in_memory();
    let first = store.add_vertex(VertexLabel::Pod, PropertyMap::new()).unwrap();

    store.clear().unwrap();
    assert_eq!(store.node_count(), 0);

    let second = store.add_vertex(VertexLabel::Pod, PropertyMap::new()).unwrap();
    assert!(second > first, "ids are never reused after clear");
    assert!(store.vertex(first).unwrap().is_none());
}

#[test]
fn test_query_limit() {
    let store = GraphStore::in_memory();
    for _ in 0..5 {
        store.add_vertex(VertexLabel::Pod, PropertyMap::new()).unwrap();
    }
    let some = store.query_vertices(&VertexFilter::all().limit(3)).unwrap();
    assert_eq!(some.len(), 3);
    assert!(some.windows(2).all(|w| w[0].id < w[1].id));
}

#[test]
fn test_persistence() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("graph");

    let (ns, pod) = {
        let store = GraphStore::open(&path).expect("create graph store");
        let ns = store
            .add_vertex(VertexLabel::Namespace, props(&[("name", json!("ns1"))]))
            .unwrap();
        let pod = store
            .add_vertex(VertexLabel::Pod, props(&[("name", json!("p1"))]))
            .unwrap();
        store
            .add_edge(ns, pod, EdgeLabel::Contains, props(&[("confidence", json!(0.7))]))
            .unwrap();
        store.flush().expect("save graph store");
        // Explicit drop to release lock before reopening
        drop(store);
        (ns, pod)
    };

    // Small delay to ensure OS releases the file lock
    std::thread::sleep(std::time::Duration::from_millis(50));

    let store = GraphStore::open(&path).expect("reload graph store");
    assert_eq!(store.node_count(), 2);
    assert_eq!(store.edge_count(), 1);

    let edges = store.query_edges(&EdgeFilter::outgoing(ns)).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to, pod);
    assert_eq!(edges[0].properties.get("confidence"), Some(&json!(0.7)));

    // The id counter survives the reload
    let next = store.add_vertex(VertexLabel::Pod, PropertyMap::new()).unwrap();
    assert!(next.0 > edges[0].id.0);
}

#[test]
fn test_clear_is_persisted() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("graph");

    {
        let store = GraphStore::open(&path).unwrap();
        store.add_vertex(VertexLabel::Pod, PropertyMap::new()).unwrap();
        store.flush().unwrap();
        store.clear().unwrap();
        store.flush().unwrap();
    }
    std::thread::sleep(std::time::Duration::from_millis(50));

    let store = GraphStore::open(&path).unwrap();
    assert_eq!(store.node_count(), 0);
    store.ping().expect("reopened store answers");
}
