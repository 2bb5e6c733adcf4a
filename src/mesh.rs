// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Triangle meshes, Wavefront OBJ loading and a few built-in shapes

use std::io::BufRead;

use nalgebra::{Point3, Vector3};

use crate::{Error, Result};

/// Plain triangle mesh, as handed to the renderer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Vertex positions
    pub positions: Vec<Point3<f32>>,
    /// Triangles, as indices into `positions`
    pub triangles: Vec<[u32; 3]>,
    /// Per-vertex RGB colors. Empty for meshes that use the material of the node.
    pub colors: Vec<Vector3<f32>>,
}

impl Mesh {
    /// Parse a Wavefront OBJ file.
    /// Only geometry is read: `v` and `f` statements. Polygons are fan triangulated,
    /// texture and normal indices (`f 1/2/3`) are ignored.
    pub fn from_obj(reader: impl BufRead) -> Result<Self> {
        let mut mesh = Mesh::default();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("v") => {
                    let mut coords = [0.0f32; 3];
                    for coord in coords.iter_mut() {
                        *coord = tokens
                            .next()
                            .and_then(|t| t.parse().ok())
                            .ok_or_else(|| Error::Mesh(format!("bad vertex on line {}", line_no + 1)))?;
                    }
                    mesh.positions.push(Point3::from(coords));
                }
                Some("f") => {
                    let indices = tokens
                        .map(|t| Self::parse_obj_index(t, mesh.positions.len()))
                        .collect::<Option<Vec<u32>>>()
                        .ok_or_else(|| Error::Mesh(format!("bad face on line {}", line_no + 1)))?;
                    if indices.len() < 3 {
                        return Err(Error::Mesh(format!("degenerate face on line {}", line_no + 1)));
                    }
                    for i in 1..indices.len() - 1 {
                        mesh.triangles.push([indices[0], indices[i], indices[i + 1]]);
                    }
                }
                _ => (),
            }
        }
        if mesh.triangles.is_empty() {
            return Err(Error::Mesh("no faces".into()));
        }
        Ok(mesh)
    }

    /// OBJ indices are 1-based, negative ones count back from the last vertex
    fn parse_obj_index(token: &str, vertex_count: usize) -> Option<u32> {
        let index: i64 = token.split('/').next()?.parse().ok()?;
        let resolved = match index {
            0 => return None,
            i if i > 0 => i - 1,
            i => vertex_count as i64 + i,
        };
        if resolved < 0 || resolved >= vertex_count as i64 {
            return None;
        }
        u32::try_from(resolved).ok()
    }

    /// Axis aligned cube centered on the origin
    pub fn cube(size: f32) -> Self {
        Self::cuboid(Point3::origin(), Vector3::repeat(size / 2.0), None)
    }

    /// Three colored bars along the X (red), Y (green) and Z (blue) axes,
    /// starting at the origin. Attached to markers as a debug helper.
    pub fn gizmo(size: f32, width: f32) -> Self {
        let half = width / 2.0;
        let mut mesh = Mesh::default();
        for axis in 0..3 {
            let mut center = Point3::origin();
            center[axis] = size / 2.0;
            let mut half_extents = Vector3::repeat(half);
            half_extents[axis] = size / 2.0;
            let mut color = Vector3::zeros();
            color[axis] = 1.0;
            mesh.append(&Self::cuboid(center, half_extents, Some(color)));
        }
        mesh
    }

    fn cuboid(center: Point3<f32>, half: Vector3<f32>, color: Option<Vector3<f32>>) -> Self {
        let positions = (0..8)
            .map(|i| {
                let sign = |bit: usize| if i & (1 << bit) != 0 { 1.0 } else { -1.0 };
                center + Vector3::new(sign(0) * half.x, sign(1) * half.y, sign(2) * half.z)
            })
            .collect::<Vec<_>>();
        #[rustfmt::skip]
        let triangles = vec![
            [0, 2, 1], [1, 2, 3], // -z
            [4, 5, 6], [5, 7, 6], // +z
            [0, 1, 4], [1, 5, 4], // -y
            [2, 6, 3], [3, 6, 7], // +y
            [0, 4, 2], [2, 4, 6], // -x
            [1, 3, 5], [3, 7, 5], // +x
        ];
        let colors = color.map(|c| vec![c; positions.len()]).unwrap_or_default();
        Self {
            positions,
            triangles,
            colors,
        }
    }

    /// Merge another mesh into this one
    pub fn append(&mut self, other: &Mesh) {
        let offset = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.colors.extend_from_slice(&other.colors);
        self.triangles.extend(
            other
                .triangles
                .iter()
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quads_and_negative_indices() {
        let obj = "# a square\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1 4//1\nf -4 -3 -2\n";
        let mesh = Mesh::from_obj(obj.as_bytes()).unwrap();
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3], [0, 1, 2]]);
    }

    #[test]
    fn rejects_broken_files() {
        assert!(Mesh::from_obj("v 0 0\n".as_bytes()).is_err());
        assert!(Mesh::from_obj("v 0 0 0\nf 1 2 3\n".as_bytes()).is_err());
        assert!(Mesh::from_obj("v 0 0 0\n".as_bytes()).is_err());
    }

    #[test]
    fn gizmo_has_three_colored_bars() {
        let gizmo = Mesh::gizmo(60.0, 4.0);
        assert_eq!(gizmo.positions.len(), 24);
        assert_eq!(gizmo.triangles.len(), 36);
        assert_eq!(gizmo.colors.len(), 24);
        let max_x = gizmo.positions.iter().map(|p| p.x).fold(f32::MIN, f32::max);
        assert_eq!(max_x, 60.0);
    }
}
