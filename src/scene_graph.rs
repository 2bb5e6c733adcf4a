// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Minimal owned scene graph that a renderer can draw. See [`SceneGraph`]
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Visibility and
//! transparency changes are propagated to the whole subtree explicitly.

use std::sync::Arc;

use nalgebra::{Isometry3, Matrix4, UnitQuaternion, Vector3};

use crate::{mesh::Mesh, Error, Result};

/// Handle of a node inside a [`SceneGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Handle of a light inside a [`SceneGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightId(usize);

/// Transparency value meaning "opaque"
pub const OPAQUE: i32 = -1;

/// A node of the scene graph
#[derive(Debug, Clone)]
pub struct SceneNode {
    /// Transform relative to the parent node
    pub transform: Isometry3<f32>,
    /// Uniform scale, applied before `transform`
    pub scale: f32,
    /// Whether the node (and its mesh) is drawn
    pub visible: bool,
    /// Renderer transparency level, [`OPAQUE`] to disable
    pub transparency: i32,
    /// Geometry attached to the node, if any
    pub mesh: Option<Arc<Mesh>>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self {
            transform: Isometry3::identity(),
            scale: 1.0,
            visible: true,
            transparency: OPAQUE,
            mesh: None,
            parent: None,
            children: Vec::new(),
        }
    }
}

impl SceneNode {
    /// Parent node, `None` for roots
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Ordered list of children
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// A point light. Lights only have a position, they never rotate.
#[derive(Debug, Clone)]
pub struct Light {
    /// Position in camera space
    pub position: Vector3<f32>,
    /// RGB intensity
    pub color: Vector3<f32>,
    /// Whether the light is enabled
    pub visible: bool,
}

/// Arena of nodes and lights
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    lights: Vec<Light>,
}

impl SceneGraph {
    /// Create an empty scene graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty, visible, parentless node
    pub fn add_node(&mut self) -> NodeId {
        self.nodes.push(SceneNode::default());
        NodeId(self.nodes.len() - 1)
    }

    /// Add a parentless node carrying a mesh
    pub fn add_mesh_node(&mut self, mesh: Arc<Mesh>) -> NodeId {
        let id = self.add_node();
        self.nodes[id.0].mesh = Some(mesh);
        id
    }

    /// Access a node
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    /// Mutable access to a node
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0)
    }

    /// Number of nodes in the graph
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Attach `child` under `parent`, detaching it from its previous parent
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if parent.0 >= self.nodes.len() || child.0 >= self.nodes.len() {
            return Err(Error::Other("Unknown scene node"));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(Error::Other("Scene node would become its own ancestor"));
        }
        if let Some(old_parent) = self.nodes[child.0].parent {
            self.remove_child(old_parent, child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Detach `child` from `parent`. The child becomes a root.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(child.0) {
            if node.parent == Some(parent) {
                node.parent = None;
            }
        }
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(node.0).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn for_subtree(&mut self, id: NodeId, mut f: impl FnMut(&mut SceneNode)) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current.0) {
                f(node);
                stack.extend_from_slice(&node.children);
            }
        }
    }

    /// Show or hide a node and its whole subtree
    pub fn set_visibility(&mut self, id: NodeId, visible: bool) {
        self.for_subtree(id, |node| node.visible = visible);
    }

    /// Set the transparency of a node and its whole subtree
    pub fn set_transparency(&mut self, id: NodeId, transparency: i32) {
        self.for_subtree(id, |node| node.transparency = transparency);
    }

    /// Replace the local transform of a node, keeping its scale
    pub fn set_transform(&mut self, id: NodeId, transform: Isometry3<f32>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.transform = transform;
        }
    }

    /// Replace only the local translation of a node
    pub fn set_translation(&mut self, id: NodeId, translation: Vector3<f32>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.transform.translation.vector = translation;
        }
    }

    /// Replace only the local rotation of a node
    pub fn set_rotation(&mut self, id: NodeId, rotation: UnitQuaternion<f32>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.transform.rotation = rotation;
        }
    }

    /// Rigid transform of a node relative to the camera (scale ignored)
    pub fn world_transform(&self, id: NodeId) -> Isometry3<f32> {
        let mut result = Isometry3::identity();
        let mut current = Some(id);
        while let Some(node) = current.and_then(|c| self.nodes.get(c.0)) {
            result = node.transform * result;
            current = node.parent;
        }
        result
    }

    /// Full model matrix of a node, including the scale of it and its ancestors
    pub fn world_matrix(&self, id: NodeId) -> Matrix4<f32> {
        let mut result = Matrix4::identity();
        let mut current = Some(id);
        while let Some(node) = current.and_then(|c| self.nodes.get(c.0)) {
            result = node.transform.to_homogeneous() * Matrix4::new_scaling(node.scale) * result;
            current = node.parent;
        }
        result
    }

    /// Everything a renderer has to draw this frame: visible nodes with a mesh,
    /// with their model matrices
    pub fn visible_meshes(&self) -> impl Iterator<Item = (NodeId, &Arc<Mesh>, Matrix4<f32>)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(index, node)| {
            let mesh = node.mesh.as_ref()?;
            if !node.visible {
                return None;
            }
            let id = NodeId(index);
            Some((id, mesh, self.world_matrix(id)))
        })
    }

    /// Add a light, hidden until its marker is seen
    pub fn add_light(&mut self, color: Vector3<f32>) -> LightId {
        self.lights.push(Light {
            position: Vector3::zeros(),
            color,
            visible: false,
        });
        LightId(self.lights.len() - 1)
    }

    /// Access a light
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id.0)
    }

    /// All lights
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Move a light
    pub fn set_light_position(&mut self, id: LightId, position: Vector3<f32>) {
        if let Some(light) = self.lights.get_mut(id.0) {
            light.position = position;
        }
    }

    /// Enable or disable a light
    pub fn set_light_visibility(&mut self, id: LightId, visible: bool) {
        if let Some(light) = self.lights.get_mut(id.0) {
            light.visible = visible;
        }
    }
}
