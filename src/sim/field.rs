//! Field geometry: table extents, penalty zones and goal volumes
//!
//! The upper goal sits on the +x byline, the lower goal on the -x byline.
//! Zones are rectangles measured inward from the byline: `.x` is the depth,
//! `.y` the half width across the field.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Axis aligned box on the field plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Inclusive containment: points on the edge are inside
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn half_size(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }
}

/// Bounding circle of a goalpost
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

/// Where the ball left the playing area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BallExit {
    /// Crossed a goal line; `upper` names the byline
    Byline { upper: bool, z: f32 },
    /// Crossed a side line; `z` is clamped onto the line
    Side { x: f32, z: f32 },
}

/// Static per-match table description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGeometry {
    /// Half size of the table (x, z), border walls sit here
    pub half_extents: Vec2,
    /// Gap between the table edge and the byline (x) / side line (z)
    pub side_delta: Vec2,
    /// Border wall thickness
    pub border: Vec2,
    pub little_area_delta: Vec2,
    pub penalty_area_delta: Vec2,
    /// Distance of the penalty mark from the byline
    pub penalty_mark_offset: f32,
    /// X of the goal mouth (positive, mirrored for the lower goal)
    pub goal_line_x: f32,
    pub goal_up: Aabb,
    pub goal_down: Aabb,
    pub goalposts: Vec<Circle>,
}

impl FieldGeometry {
    /// Reference table
    pub fn standard() -> Self {
        let half_extents = Vec2::new(19.1, 12.85);
        let side_delta = Vec2::new(2.054, 1.904);
        let goal_line_x = half_extents.x - side_delta.x;
        let mouth = 2.6;
        let depth = 1.5;
        let post = 0.15;

        Self {
            half_extents,
            side_delta,
            border: Vec2::new(0.5, 0.5),
            little_area_delta: Vec2::new(2.4, 3.6),
            penalty_area_delta: Vec2::new(6.0, 7.2),
            penalty_mark_offset: 4.2,
            goal_line_x,
            goal_up: Aabb::new(
                Vec2::new(goal_line_x, -mouth),
                Vec2::new(goal_line_x + depth, mouth),
            ),
            goal_down: Aabb::new(
                Vec2::new(-goal_line_x - depth, -mouth),
                Vec2::new(-goal_line_x, mouth),
            ),
            goalposts: vec![
                Circle { center: Vec2::new(goal_line_x, mouth), radius: post },
                Circle { center: Vec2::new(goal_line_x, -mouth), radius: post },
                Circle { center: Vec2::new(-goal_line_x, mouth), radius: post },
                Circle { center: Vec2::new(-goal_line_x, -mouth), radius: post },
            ],
        }
    }

    /// Parse a field description; every key is required
    pub fn from_json(json: &str) -> Result<Self, FieldError> {
        let geometry: Self = serde_json::from_str(json)?;
        geometry.validate()?;
        Ok(geometry)
    }

    /// Check the zone invariants
    pub fn validate(&self) -> Result<(), FieldError> {
        let invalid = |message: String| Err(FieldError::Invalid { message });

        if self.half_extents.x <= 0.0 || self.half_extents.y <= 0.0 {
            return invalid(format!("non-positive half extents {}", self.half_extents));
        }
        let deltas = [
            ("side", self.side_delta),
            ("little area", self.little_area_delta),
            ("penalty area", self.penalty_area_delta),
        ];
        for (name, delta) in deltas {
            if delta.x < 0.0 || delta.y < 0.0 {
                return invalid(format!("{name} delta {delta} is negative"));
            }
            if delta.x >= self.half_extents.x || delta.y >= self.half_extents.y {
                return invalid(format!(
                    "{name} delta {delta} reaches the half extents {}",
                    self.half_extents
                ));
            }
        }
        if self.penalty_mark_offset <= 0.0 || self.penalty_mark_offset >= self.byline_x() {
            return invalid(format!("penalty mark offset {}", self.penalty_mark_offset));
        }
        if self.goal_up.min.x < 0.0 || self.goal_down.max.x > 0.0 {
            return invalid("goal boxes are on the wrong side of the field".to_string());
        }
        if self.goal_up.max.x > self.half_extents.x || self.goal_down.min.x < -self.half_extents.x
        {
            return invalid("goal boxes extend past the border walls".to_string());
        }
        Ok(())
    }

    /// X of the upper byline
    #[inline]
    pub fn byline_x(&self) -> f32 {
        self.half_extents.x - self.side_delta.x
    }

    /// Z of the side line
    #[inline]
    pub fn sideline_z(&self) -> f32 {
        self.half_extents.y - self.side_delta.y
    }

    /// +1 for the upper half, -1 for the lower
    #[inline]
    fn sign(upper: bool) -> f32 {
        if upper { 1.0 } else { -1.0 }
    }

    fn in_zone(&self, upper: bool, p: Vec2, delta: Vec2) -> bool {
        let x = p.x * Self::sign(upper);
        let line = self.byline_x();
        x >= line - delta.x && x <= line && p.y.abs() <= delta.y
    }

    pub fn is_inner_little_area(&self, upper: bool, p: Vec2) -> bool {
        self.in_zone(upper, p, self.little_area_delta)
    }

    /// Penalty area of the given goal (includes the little area)
    pub fn is_inner_penalty_area(&self, upper: bool, p: Vec2) -> bool {
        self.in_zone(upper, p, self.penalty_area_delta)
    }

    /// X of the penalty-area line that faces the field
    pub fn penalty_area_edge_x(&self, upper: bool) -> f32 {
        Self::sign(upper) * (self.byline_x() - self.penalty_area_delta.x)
    }

    pub fn penalty_mark(&self, upper: bool) -> Vec2 {
        Vec2::new(Self::sign(upper) * (self.byline_x() - self.penalty_mark_offset), 0.0)
    }

    pub fn center_spot(&self) -> Vec2 {
        Vec2::ZERO
    }

    /// Corner of the given byline on the side the ball went out
    pub fn corner_spot(&self, upper: bool, z: f32) -> Vec2 {
        let side = if z < 0.0 { -1.0 } else { 1.0 };
        Vec2::new(Self::sign(upper) * self.byline_x(), side * self.sideline_z())
    }

    pub fn goal_kick_spot(&self, upper: bool) -> Vec2 {
        Vec2::new(Self::sign(upper) * (self.byline_x() - self.little_area_delta.x), 0.0)
    }

    pub fn throw_in_spot(&self, x: f32, z: f32) -> Vec2 {
        let side = if z < 0.0 { -1.0 } else { 1.0 };
        let line = self.byline_x();
        Vec2::new(x.clamp(-line, line), side * self.sideline_z())
    }

    /// Clamp a point into the playing area
    pub fn clamp_to_field(&self, p: Vec2) -> Vec2 {
        let limit = Vec2::new(self.byline_x(), self.sideline_z());
        p.clamp(-limit, limit)
    }

    pub fn goal(&self, upper: bool) -> &Aabb {
        if upper { &self.goal_up } else { &self.goal_down }
    }

    /// Whether the whole ball is past the goal line inside the goal box
    ///
    /// The radius is applied on the inbound axis only, so a ball partly
    /// overlapping the mouth does not count.
    pub fn ball_in_goal(&self, upper: bool, center: Vec2, radius: f32) -> bool {
        let trailing_edge = Vec2::new(center.x - Self::sign(upper) * radius, center.y);
        self.goal(upper).contains(trailing_edge)
    }

    /// Whether the whole ball has crossed a byline or side line
    pub fn field_exit(&self, center: Vec2, radius: f32) -> Option<BallExit> {
        if center.x.abs() - radius > self.byline_x() {
            return Some(BallExit::Byline { upper: center.x > 0.0, z: center.y });
        }
        let line = self.sideline_z();
        if center.y.abs() - radius > line {
            return Some(BallExit::Side { x: center.x, z: center.y.clamp(-line, line) });
        }
        None
    }
}

impl Default for FieldGeometry {
    fn default() -> Self {
        Self::standard()
    }
}
