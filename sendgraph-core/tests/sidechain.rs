mod common;

use common::{kick_and_bass, Session};
use sendgraph_core::provisioner::{BuildStep, BusProvisioner, SidechainRequest};
use sendgraph_core::{RouteValidator, RoutingConfig, RoutingError};
use sendgraph_types::{NodeHandle, ProblemKind, SidechainMode, UnitIndex};

#[test]
fn sidechain_into_four_channel_compressor() {
    let (session, kick, bass) = kick_and_bass();
    let provisioner = BusProvisioner::new(&session.graph);

    let send = provisioner
        .create_sidechain_send(
            &SidechainRequest::new(kick, bass)
                .dest_channels(3)
                .level_db(-6.0)
                .pre_fader(true),
        )
        .unwrap();

    assert_eq!(send.sidechain_channels, 3);
    assert!(send.route_valid);
    assert!(send.pre_fader);
    assert_eq!(send.compressor_unit, None);
    assert!(send.latency_ms > 0.0);

    let outgoing = session.graph.list_outgoing(kick).unwrap();
    assert_eq!(outgoing.len(), 1);
    let edge = &outgoing[0];
    assert_eq!(edge.destination, bass);
    assert_eq!(edge.id, send.send_id);
    assert!(edge.targets_sidechain());
    assert_eq!(edge.attrs.src_channel, 0);
    assert_eq!(edge.attrs.dst_channel, 2);
    assert!(edge.attrs.stage.is_pre_fader());
    assert!((edge.volume_db() + 6.0).abs() < 1e-9);
}

#[test]
fn sidechain_to_self_is_refused() {
    let (session, kick, _bass) = kick_and_bass();
    let err = BusProvisioner::new(&session.graph)
        .create_sidechain_send(&SidechainRequest::new(kick, kick))
        .unwrap_err();
    assert!(matches!(err.error, RoutingError::StructuralConflict(_)));
    assert!(session.graph.list_outgoing(kick).unwrap().is_empty());
}

#[test]
fn analyze_missing_destination() {
    let (session, kick, _bass) = kick_and_bass();
    let analysis = RouteValidator::new(&session.graph).analyze(kick, NodeHandle::from_raw(999));
    assert!(!analysis.valid);
    assert!(analysis
        .error_messages()
        .iter()
        .any(|m| m.contains("does not exist")));
}

#[test]
fn sidechain_to_missing_destination_is_not_found() {
    let (session, kick, _bass) = kick_and_bass();
    let err = BusProvisioner::new(&session.graph)
        .create_sidechain_send(&SidechainRequest::new(kick, NodeHandle::from_raw(999)))
        .unwrap_err();
    assert!(matches!(err.error, RoutingError::NotFound(_)));
}

#[test]
fn feedback_loop_blocks_reverse_sidechain() {
    let (session, kick, bass) = kick_and_bass();
    let provisioner = BusProvisioner::new(&session.graph);
    provisioner
        .create_sidechain_send(&SidechainRequest::new(kick, bass))
        .unwrap();

    let analysis = RouteValidator::new(&session.graph).validate(bass, kick, 1);
    assert!(!analysis.valid);
    assert!(analysis.has_error(ProblemKind::StructuralConflict));

    let err = provisioner
        .create_sidechain_send(&SidechainRequest::new(bass, kick).dest_channels(1))
        .unwrap_err();
    assert!(matches!(err.error, RoutingError::StructuralConflict(_)));
}

#[test]
fn stereo_destination_is_widened() {
    let session = Session::new();
    let kick = session.track("Kick", 2, &[]);
    let pad = session.track("Pad", 2, &["ReaComp"]);

    let send = BusProvisioner::new(&session.graph)
        .create_sidechain_send(&SidechainRequest::new(kick, pad))
        .unwrap();

    assert!(send.route_valid);
    assert_eq!(session.graph.node_info(pad).unwrap().channel_count, 4);
}

#[test]
fn main_pair_needs_no_widening() {
    let session = Session::new();
    let kick = session.track("Kick", 2, &[]);
    let pad = session.track("Pad", 2, &["ReaComp"]);

    let send = BusProvisioner::new(&session.graph)
        .create_sidechain_send(&SidechainRequest::new(kick, pad).dest_channels(1))
        .unwrap();

    assert_eq!(send.sidechain_channels, 1);
    assert_eq!(session.graph.node_info(pad).unwrap().channel_count, 2);
    let edge = session.graph.edge(kick, send.send_id).unwrap();
    assert_eq!(edge.attrs.dst_channel, 0);
}

#[test]
fn unsupported_pair_is_refused() {
    let (session, kick, bass) = kick_and_bass();
    let err = BusProvisioner::new(&session.graph)
        .create_sidechain_send(&SidechainRequest::new(kick, bass).dest_channels(2))
        .unwrap_err();
    assert!(matches!(err.error, RoutingError::InvalidArgument(_)));
    assert_eq!(session.sends_created(), 0);
}

#[test]
fn with_compressor_attaches_configured_plugin() {
    let session = Session::new();
    let kick = session.track("Kick", 2, &[]);
    let synth = session.track("Synth", 4, &["ReaEQ"]);
    let config = RoutingConfig {
        compressor_plugin: "Pro Comp".into(),
        ..RoutingConfig::default()
    };

    let send = BusProvisioner::with_config(&session.graph, config)
        .create_sidechain_send(
            &SidechainRequest::new(kick, synth).mode(SidechainMode::WithCompressor),
        )
        .unwrap();

    assert_eq!(send.compressor_unit, Some(UnitIndex::new(1)));
    assert_eq!(session.surface.unit_names(synth), vec!["ReaEQ", "Pro Comp"]);
    // No warning about missing sidechain units once the compressor is there.
    let analysis = RouteValidator::new(&session.graph).analyze(kick, synth);
    assert!(!analysis.warnings.iter().any(|w| w.contains("sidechain-capable")));
}

#[test]
fn failed_compressor_keeps_send_in_log() {
    let session = Session::new();
    let kick = session.track("Kick", 2, &[]);
    let synth = session.track("Synth", 4, &[]);
    session.surface.reject_plugin("ReaComp");

    let err = BusProvisioner::new(&session.graph)
        .create_sidechain_send(
            &SidechainRequest::new(kick, synth).mode(SidechainMode::WithCompressor),
        )
        .unwrap_err();

    assert!(matches!(err.error, RoutingError::ExternalCallFailure(_)));
    assert!(!err.rolled_back);
    assert!(matches!(
        err.partial.steps(),
        [BuildStep::CreatedEdge { source, .. }] if *source == kick
    ));
    assert_eq!(session.graph.list_outgoing(kick).unwrap().len(), 1);
}
