mod common;

use common::Session;
use sendgraph_core::graph::FOLDER_START;
use sendgraph_core::RoutingError;
use sendgraph_types::NodeKind;

#[test]
fn drum_folder_collects_following_tracks() {
    let session = Session::new();
    let graph = &session.graph;
    let drums = graph
        .create_node(&NodeKind::Folder { name: "Drums".into() })
        .unwrap();
    let kick = graph.create_node(&NodeKind::Track).unwrap();
    let snare = graph.create_node(&NodeKind::Track).unwrap();
    let vocals = graph.create_node(&NodeKind::Track).unwrap();

    graph.set_parent(kick, drums).unwrap();
    graph.set_parent(snare, drums).unwrap();

    assert_eq!(graph.children(drums).unwrap(), vec![kick, snare]);
    assert_eq!(graph.folder_depth(vocals).unwrap(), 0);
    assert_eq!(graph.folder_depth(kick).unwrap(), FOLDER_START);
}

#[test]
fn folders_do_not_touch_sends() {
    let session = Session::new();
    let bus = session.track("Bus", 2, &[]);
    let child = session.track("Child", 2, &[]);
    session.graph.set_parent(child, bus).unwrap();
    assert_eq!(session.edges_touching(bus), 0);
    assert_eq!(session.sends_created(), 0);
}

#[test]
fn parent_must_precede_child() {
    let session = Session::new();
    let late = session.track("Late", 2, &[]);
    let folder = session.track("Folder", 2, &[]);
    let err = session.graph.set_parent(late, folder).unwrap_err();
    assert!(matches!(err, RoutingError::InvalidArgument(ref m) if m.contains("after")));
    assert_eq!(session.graph.folder_depth(folder).unwrap(), 0);
}
