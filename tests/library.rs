use anyhow::Result;
use flowcanvas::{
    CanvasController, CanvasState, DiagramOrigin, FallbackReason, LayoutOptions, NodeShape, Theme,
    compute_layout, generate_canvas, normalize_response, normalize_text, render_svg,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn decision_response() -> serde_json::Value {
    json!({
        "diagram": {
            "nodes": [
                {"id": "s", "type": "start", "text": "Begin"},
                {"id": "d", "type": "decision", "text": "Valid?"},
                {"id": "y", "type": "process", "text": "Accept"},
                {"id": "n", "type": "process", "text": "Reject"}
            ],
            "connections": [
                {"from": "s", "to": "d"},
                {"from": "d", "to": "n", "label": "No"},
                {"from": "d", "to": "y", "label": "Yes"}
            ]
        }
    })
}

#[test]
fn yes_branch_lands_left_and_no_branch_right() -> Result<()> {
    let diagram = normalize_response(&decision_response());
    assert_eq!(diagram.origin, DiagramOrigin::Parsed);

    let yes = diagram
        .nodes
        .iter()
        .find(|node| node.original_id.as_deref() == Some("y"))
        .map(|node| node.id.clone())
        .expect("yes node survives");
    let no = diagram
        .nodes
        .iter()
        .find(|node| node.original_id.as_deref() == Some("n"))
        .map(|node| node.id.clone())
        .expect("no node survives");

    let layout = compute_layout(&diagram, &LayoutOptions::default());
    let levels: Vec<usize> = diagram
        .nodes
        .iter()
        .map(|node| layout.placement(&node.id).map(|p| p.level).unwrap_or(usize::MAX))
        .collect();
    assert_eq!(levels, vec![0, 1, 2, 2]);

    let decision_x = layout.placement("node2").map(|p| p.center_x()).unwrap_or_default();
    let yes_x = layout.placement(&yes).map(|p| p.center_x()).unwrap_or_default();
    let no_x = layout.placement(&no).map(|p| p.center_x()).unwrap_or_default();
    assert!(yes_x < decision_x, "yes branch should sit left of the decision");
    assert!(no_x > decision_x, "no branch should sit right of the decision");

    let canvas = generate_canvas(&diagram, &LayoutOptions::default());
    let decision = canvas.node("node2").expect("decision node placed");
    assert_eq!(decision.shape, NodeShape::Diamond);
    Ok(())
}

#[test]
fn layout_is_deterministic() -> Result<()> {
    let diagram = normalize_response(&decision_response());
    let first = generate_canvas(&diagram, &LayoutOptions::default()).to_json()?;
    let second = generate_canvas(&diagram, &LayoutOptions::default()).to_json()?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn cyclic_graphs_still_lay_out() -> Result<()> {
    let diagram = normalize_response(&json!({
        "nodes": [{"id": "a"}, {"id": "b"}, {"id": "c"}],
        "connections": [
            {"from": "a", "to": "b"},
            {"from": "b", "to": "c"},
            {"from": "c", "to": "a"}
        ]
    }));

    let layout = compute_layout(&diagram, &LayoutOptions::default());
    assert_eq!(layout.placements.len(), 3);
    assert_eq!(layout.placement("node1").map(|p| p.level), Some(0));
    assert!(layout.canvas_width >= 2000.0);
    Ok(())
}

#[test]
fn unusable_responses_fall_back_to_starter_diagram() -> Result<()> {
    let cases = [
        (normalize_response(&json!({})), FallbackReason::EmptyDiagram),
        (normalize_response(&json!(null)), FallbackReason::MalformedResponse),
        (normalize_text("I could not think of a diagram."), FallbackReason::MalformedResponse),
    ];

    for (diagram, reason) in cases {
        assert_eq!(diagram.origin, DiagramOrigin::Fallback(reason));
        let texts: Vec<&str> = diagram.nodes.iter().map(|node| node.text.as_str()).collect();
        assert_eq!(texts, vec!["Start", "Process", "End"]);
        assert_eq!(diagram.connections.len(), 2);
        assert!(diagram.notice().is_some());
    }

    let recovered = normalize_response(&json!({"nodes": "three boxes"}));
    assert!(recovered.is_error_recovery());
    Ok(())
}

#[test]
fn generated_canvas_survives_save_and_reload() -> Result<()> {
    let diagram = normalize_text(&format!(
        "Here you go:\n```json\n{}\n```",
        decision_response()
    ));
    let canvas = generate_canvas(&diagram, &LayoutOptions::default());
    canvas.validate()?;

    let saved = canvas.to_json()?;
    let reloaded = CanvasState::from_json(&saved)?;
    assert_eq!(reloaded.to_json()?, saved);

    let mut controller = CanvasController::default();
    controller.load_snapshot(&saved)?;
    assert_eq!(controller.snapshot_json()?, saved);
    Ok(())
}

#[test]
fn generated_canvas_renders_to_svg() -> Result<()> {
    let canvas = generate_canvas(&normalize_response(&decision_response()), &LayoutOptions::default());
    let svg = render_svg(&canvas, &Theme::for_mode(true), None)?;

    assert!(svg.contains("<svg"), "rendered svg should contain root element");
    for text in ["Begin", "Valid?", "Accept", "Reject", ">Yes<", ">No<"] {
        assert!(svg.contains(text), "missing {text}");
    }
    Ok(())
}

#[test]
fn interactive_edits_keep_ids_unique() -> Result<()> {
    let mut controller = CanvasController::default();
    controller.begin_generation()?;
    controller.complete_generation(&decision_response())?;

    let appended = controller.add_node(0.0, 0.0, Some("Notify"), None);
    let lowest_bottom = controller
        .state()
        .nodes()
        .filter(|node| node.id != appended)
        .map(|node| node.bottom())
        .fold(f64::MIN, f64::max);
    let node = controller.state().node(&appended).expect("appended node");
    assert_eq!(node.y, lowest_bottom + 60.0);

    controller.add_connection("node3", &appended, Some("then".into()))?;
    controller.state().validate()?;
    assert_eq!(controller.state().node_count(), 5);
    Ok(())
}
