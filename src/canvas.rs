use log::{debug, info, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::autosave::{AutosaveHandle, SaveStatus};
use crate::config::EditorConfig;
use crate::errors::{CanvasError, CanvasResult};
use crate::layout::{LayoutOptions, generate_canvas};
use crate::model::{
    CanvasElement, CanvasState, ConnectionHandle, ConnectionStyle, DiagramConnection, DiagramNode,
    LineStyle, NodeStyle, Point,
};
use crate::normalize::{NormalizedDiagram, normalize_response, normalize_text};
use crate::path::compute_connector_path;
use crate::viewport::Viewport;
use crate::{APPEND_NODE_GAP, DEFAULT_NODE_TEXT, HANDLE_HIT_RADIUS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Node(String),
    Connection(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Idle,
    Dragging {
        node_id: String,
        /// Pointer position relative to the node's top-left corner.
        grab: Point,
    },
    Panning,
    Connecting {
        source_id: String,
        handle: ConnectionHandle,
        cursor: Point,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPreview {
    pub source_id: String,
    pub from: Point,
    pub to: Point,
}

/// Owns the canvas state and translates pointer input into edits.
#[derive(Debug)]
pub struct CanvasController {
    state: CanvasState,
    viewport: Viewport,
    layout: LayoutOptions,
    interaction: Interaction,
    selection: Option<Selection>,
    revision: u64,
    clean_revision: u64,
    generating: bool,
    autosave: Option<AutosaveHandle>,
}

impl Default for CanvasController {
    fn default() -> Self {
        Self::new(CanvasState::empty(), LayoutOptions::default())
    }
}

impl CanvasController {
    pub fn new(state: CanvasState, layout: LayoutOptions) -> Self {
        Self {
            state,
            viewport: Viewport::default(),
            layout,
            interaction: Interaction::Idle,
            selection: None,
            revision: 0,
            clean_revision: 0,
            generating: false,
            autosave: None,
        }
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(CanvasState::empty(), config.layout)
    }

    pub fn with_autosave(mut self, autosave: AutosaveHandle) -> Self {
        self.autosave = Some(autosave);
        self
    }

    pub fn attach_autosave(&mut self, autosave: AutosaveHandle) -> Option<AutosaveHandle> {
        self.autosave.replace(autosave)
    }

    pub fn detach_autosave(&mut self) -> Option<AutosaveHandle> {
        self.autosave.take()
    }

    pub fn state(&self) -> &CanvasState {
        &self.state
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn layout_options(&self) -> &LayoutOptions {
        &self.layout
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn selected(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn select(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True while edits exist that no save has confirmed yet.
    pub fn is_dirty(&self) -> bool {
        if let Some(SaveStatus::Saved { revision, .. }) = self.save_status() {
            if revision >= self.revision {
                return false;
            }
        }
        self.revision != self.clean_revision
    }

    pub fn save_status(&self) -> Option<SaveStatus> {
        self.autosave.as_ref().map(AutosaveHandle::status)
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn snapshot_json(&self) -> CanvasResult<String> {
        self.state.to_json()
    }

    fn touch(&mut self) {
        self.revision += 1;
        let Some(autosave) = &self.autosave else {
            return;
        };
        match self.state.to_json() {
            Ok(json) => autosave.schedule(self.revision, json),
            Err(err) => warn!("could not serialize canvas revision {}: {err}", self.revision),
        }
    }

    fn reset_gestures(&mut self) {
        if matches!(self.interaction, Interaction::Panning) {
            self.viewport.end_pan();
        }
        self.interaction = Interaction::Idle;
    }

    pub fn replace_state(&mut self, state: CanvasState) -> CanvasResult<()> {
        state.validate()?;
        self.state = state;
        self.selection = None;
        self.reset_gestures();
        self.touch();
        Ok(())
    }

    /// Loads a persisted snapshot without scheduling a save for it.
    pub fn load_snapshot(&mut self, json: &str) -> CanvasResult<()> {
        let state = CanvasState::from_json(json)?;
        state.validate()?;
        self.state = state;
        self.selection = None;
        self.reset_gestures();
        self.revision += 1;
        self.clean_revision = self.revision;
        Ok(())
    }

    fn fresh_id(&self, prefix: &str) -> String {
        loop {
            let id = format!("{prefix}-{}", Uuid::new_v4());
            if !self.state.contains_id(&id) {
                return id;
            }
        }
    }

    /// Adds a node and returns its id.
    ///
    /// On an empty canvas the node is centred in the visible area whatever
    /// the requested position. Otherwise `(0, 0)` means "no position" and
    /// appends the node below the lowest existing node.
    pub fn add_node(
        &mut self,
        x: f64,
        y: f64,
        text: Option<&str>,
        style: Option<NodeStyle>,
    ) -> String {
        let id = self.fresh_id("node");
        let mut node = DiagramNode::new(id.clone(), x, y, text.unwrap_or(DEFAULT_NODE_TEXT));
        if let Some(style) = style {
            node.style = style;
        }

        let lowest = self
            .state
            .nodes()
            .max_by(|a, b| a.bottom().total_cmp(&b.bottom()))
            .map(|lowest| (lowest.x, lowest.bottom()));

        match lowest {
            None => {
                let center = self.viewport.visible_center_world();
                node.x = center.x - node.width / 2.0;
                node.y = center.y - node.height / 2.0;
            }
            Some((lowest_x, lowest_bottom)) if x == 0.0 && y == 0.0 => {
                node.x = lowest_x;
                node.y = lowest_bottom + APPEND_NODE_GAP;
            }
            Some(_) => {}
        }

        debug!("adding node {id} at ({}, {})", node.x, node.y);
        self.state.elements.push(CanvasElement::Node(node));
        self.selection = Some(Selection::Node(id.clone()));
        self.touch();
        id
    }

    pub fn add_connection(
        &mut self,
        source_id: &str,
        target_id: &str,
        label: Option<String>,
    ) -> CanvasResult<String> {
        let id = self.fresh_id("conn");
        for endpoint in [source_id, target_id] {
            if self.state.node(endpoint).is_none() {
                return Err(CanvasError::DanglingReference {
                    connection: id,
                    node: endpoint.to_string(),
                });
            }
        }

        let mut connection = DiagramConnection::new(id.clone(), source_id, target_id, label);
        connection.style = ConnectionStyle {
            line_style: LineStyle::Orthogonal,
            ..ConnectionStyle::default()
        };

        // Connections sit beneath the nodes in paint order.
        let index = self
            .state
            .elements
            .iter()
            .position(|element| matches!(element, CanvasElement::Node(_)))
            .unwrap_or(self.state.elements.len());
        self.state
            .elements
            .insert(index, CanvasElement::Connection(connection));
        self.touch();
        Ok(id)
    }

    /// Removes a node together with every connection attached to it.
    pub fn remove_node(&mut self, id: &str) -> CanvasResult<DiagramNode> {
        let index = self
            .state
            .elements
            .iter()
            .position(|element| matches!(element, CanvasElement::Node(node) if node.id == id))
            .ok_or_else(|| CanvasError::UnknownNode(id.to_string()))?;

        let CanvasElement::Node(node) = self.state.elements.remove(index) else {
            return Err(CanvasError::UnknownNode(id.to_string()));
        };
        self.state.elements.retain(|element| match element {
            CanvasElement::Connection(connection) => !connection.touches(id),
            CanvasElement::Node(_) => true,
        });

        let selection_gone = match &self.selection {
            Some(Selection::Node(selected)) => selected == id,
            Some(Selection::Connection(selected)) => self.state.connection(selected).is_none(),
            None => false,
        };
        if selection_gone {
            self.selection = None;
        }
        if self.gesture_involves(id) {
            self.reset_gestures();
        }

        self.touch();
        Ok(node)
    }

    pub fn remove_connection(&mut self, id: &str) -> CanvasResult<DiagramConnection> {
        let index = self
            .state
            .elements
            .iter()
            .position(|element| {
                matches!(element, CanvasElement::Connection(connection) if connection.id == id)
            })
            .ok_or_else(|| CanvasError::UnknownConnection(id.to_string()))?;

        let CanvasElement::Connection(connection) = self.state.elements.remove(index) else {
            return Err(CanvasError::UnknownConnection(id.to_string()));
        };
        if self.selection == Some(Selection::Connection(id.to_string())) {
            self.selection = None;
        }
        self.touch();
        Ok(connection)
    }

    pub fn set_node_text(&mut self, id: &str, text: &str) -> CanvasResult<()> {
        let node = self
            .state
            .node_mut(id)
            .ok_or_else(|| CanvasError::UnknownNode(id.to_string()))?;
        node.text = text.to_string();
        self.touch();
        Ok(())
    }

    pub fn move_node(&mut self, id: &str, x: f64, y: f64) -> CanvasResult<()> {
        let node = self
            .state
            .node_mut(id)
            .ok_or_else(|| CanvasError::UnknownNode(id.to_string()))?;
        node.x = x;
        node.y = y;
        self.touch();
        Ok(())
    }

    fn gesture_involves(&self, id: &str) -> bool {
        match &self.interaction {
            Interaction::Dragging { node_id, .. } => node_id == id,
            Interaction::Connecting { source_id, .. } => source_id == id,
            Interaction::Idle | Interaction::Panning => false,
        }
    }

    pub fn node_at(&self, world: Point) -> Option<&DiagramNode> {
        self.state
            .elements
            .iter()
            .rev()
            .find_map(|element| match element {
                CanvasElement::Node(node) if node.contains(world) => Some(node),
                _ => None,
            })
    }

    pub fn handle_at(&self, world: Point) -> Option<(&DiagramNode, ConnectionHandle)> {
        let radius = HANDLE_HIT_RADIUS / self.viewport.scale;
        self.state.elements.iter().rev().find_map(|element| {
            let CanvasElement::Node(node) = element else {
                return None;
            };
            ConnectionHandle::ALL
                .into_iter()
                .find(|handle| node.handle_position(*handle).distance(world) <= radius)
                .map(|handle| (node, handle))
        })
    }

    pub fn connection_label_at(&self, world: Point) -> Option<&DiagramConnection> {
        self.state.elements.iter().rev().find_map(|element| {
            let CanvasElement::Connection(connection) = element else {
                return None;
            };
            connection.label.as_ref()?;
            let source = self.state.node(&connection.source_id)?;
            let target = self.state.node(&connection.target_id)?;
            let label = compute_connector_path(source, target, &connection.style).label;
            let origin = label.origin();
            let hit = world.x >= origin.x
                && world.x <= origin.x + label.width
                && world.y >= origin.y
                && world.y <= origin.y + label.height;
            hit.then_some(connection)
        })
    }

    pub fn pointer_down(&mut self, screen: Point) {
        self.reset_gestures();
        let world = self.viewport.screen_to_world(screen);

        if let Some((node, handle)) = self.handle_at(world) {
            let source_id = node.id.clone();
            self.selection = Some(Selection::Node(source_id.clone()));
            self.interaction = Interaction::Connecting {
                source_id,
                handle,
                cursor: world,
            };
            return;
        }

        if let Some(node) = self.node_at(world) {
            let node_id = node.id.clone();
            let grab = Point::new(world.x - node.x, world.y - node.y);
            self.selection = Some(Selection::Node(node_id.clone()));
            self.interaction = Interaction::Dragging { node_id, grab };
            return;
        }

        if let Some(connection) = self.connection_label_at(world) {
            self.selection = Some(Selection::Connection(connection.id.clone()));
            return;
        }

        self.selection = None;
        self.viewport.begin_pan(screen);
        self.interaction = Interaction::Panning;
    }

    pub fn pointer_move(&mut self, screen: Point) -> bool {
        let world = self.viewport.screen_to_world(screen);
        match &mut self.interaction {
            Interaction::Idle => false,
            Interaction::Panning => self.viewport.update_pan(screen),
            Interaction::Connecting { cursor, .. } => {
                *cursor = world;
                true
            }
            Interaction::Dragging { node_id, grab } => {
                let (x, y) = (world.x - grab.x, world.y - grab.y);
                let Some(node) = self.state.node_mut(node_id) else {
                    self.interaction = Interaction::Idle;
                    return false;
                };
                if node.x == x && node.y == y {
                    return false;
                }
                node.x = x;
                node.y = y;
                self.touch();
                true
            }
        }
    }

    /// Finishes the current gesture. A connection draw released over
    /// another node's body creates the connection and returns its id.
    pub fn pointer_up(&mut self, screen: Point) -> Option<String> {
        let world = self.viewport.screen_to_world(screen);
        let interaction = std::mem::replace(&mut self.interaction, Interaction::Idle);
        match interaction {
            Interaction::Panning => {
                self.viewport.end_pan();
                None
            }
            Interaction::Connecting { source_id, .. } => {
                let target_id = self
                    .node_at(world)
                    .filter(|target| target.id != source_id)
                    .map(|target| target.id.clone())?;
                match self.add_connection(&source_id, &target_id, None) {
                    Ok(id) => {
                        self.selection = Some(Selection::Connection(id.clone()));
                        Some(id)
                    }
                    Err(err) => {
                        warn!("discarding connection draw: {err}");
                        None
                    }
                }
            }
            Interaction::Idle | Interaction::Dragging { .. } => None,
        }
    }

    /// Pointer left the canvas: drags keep their last position, pans stop
    /// and an unfinished connection is discarded.
    pub fn pointer_leave(&mut self) {
        self.reset_gestures();
    }

    pub fn wheel(&mut self, screen: Point, delta_y: f64) -> bool {
        self.viewport.zoom_at_pointer(screen, delta_y)
    }

    pub fn connection_preview(&self) -> Option<ConnectionPreview> {
        let Interaction::Connecting {
            source_id,
            handle,
            cursor,
        } = &self.interaction
        else {
            return None;
        };
        let source = self.state.node(source_id)?;
        Some(ConnectionPreview {
            source_id: source_id.clone(),
            from: source.handle_position(*handle),
            to: *cursor,
        })
    }

    pub fn begin_generation(&mut self) -> CanvasResult<()> {
        if self.generating {
            return Err(CanvasError::GenerationInProgress);
        }
        self.generating = true;
        Ok(())
    }

    pub fn cancel_generation(&mut self) {
        self.generating = false;
    }

    pub fn complete_generation(&mut self, response: &Value) -> CanvasResult<NormalizedDiagram> {
        self.finish_generation(|| normalize_response(response))
    }

    pub fn complete_generation_text(&mut self, response: &str) -> CanvasResult<NormalizedDiagram> {
        self.finish_generation(|| normalize_text(response))
    }

    fn finish_generation(
        &mut self,
        normalize: impl FnOnce() -> NormalizedDiagram,
    ) -> CanvasResult<NormalizedDiagram> {
        if !self.generating {
            return Err(CanvasError::GenerationNotStarted);
        }
        self.generating = false;

        let diagram = normalize();
        if let Some(notice) = diagram.notice() {
            info!("{notice}");
        }
        let state = generate_canvas(&diagram, &self.layout);
        info!(
            "generated canvas with {} nodes and {} connections",
            diagram.nodes.len(),
            diagram.connections.len()
        );
        self.replace_state(state)?;
        Ok(diagram)
    }
}
