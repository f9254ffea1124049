//! Point lights, the bounded light collection and the lights uniform block

use bytemuck::{Pod, Zeroable};
use cgmath::{Point3, Vector4};

use crate::config::MAX_LIGHTS;
use crate::error::{RenderError, Result};

/// A point light. Its index in the [`LightSet`] is its shadow map slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// World-space position, w = 1
    pub position: Vector4<f32>,
    pub color: Vector4<f32>,
}

impl Light {
    pub fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self {
            position: Vector4::new(position[0], position[1], position[2], 1.0),
            color: Vector4::new(color[0], color[1], color[2], 1.0),
        }
    }

    pub fn point(&self) -> Point3<f32> {
        Point3::new(self.position.x, self.position.y, self.position.z)
    }

    fn raw(&self) -> LightRaw {
        LightRaw {
            position: self.position.into(),
            color: self.color.into(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightRaw {
    pub position: [f32; 4],
    pub color: [f32; 4],
}

/// GPU layout of the lights block (`@binding(2)`)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightsBlock {
    pub lights: [LightRaw; MAX_LIGHTS],
    pub count: u32,
    pub _padding: [u32; 3],
}

/// Ordered light collection with a fixed capacity
///
/// Adding past the capacity is an error rather than a silent truncation.
#[derive(Debug, Clone, PartialEq)]
pub struct LightSet {
    lights: Vec<Light>,
    capacity: usize,
}

impl LightSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_LIGHTS);
        Self {
            lights: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, light: Light) -> Result<usize> {
        if self.lights.len() >= self.capacity {
            return Err(RenderError::LightCapacity {
                capacity: self.capacity,
            });
        }
        self.lights.push(light);
        Ok(self.lights.len() - 1)
    }

    /// Shrinks or grows the capacity. Fails without changes if the set
    /// already holds more lights than `capacity`.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        let capacity = capacity.min(MAX_LIGHTS);
        if self.lights.len() > capacity {
            return Err(RenderError::LightCapacity { capacity });
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Removes a light; later lights shift down one shadow slot
    pub fn remove(&mut self, index: usize) -> Option<Light> {
        (index < self.lights.len()).then(|| self.lights.remove(index))
    }

    /// Moves a light. Returns true if the position actually changed.
    pub fn set_position(&mut self, index: usize, position: Point3<f32>) -> bool {
        match self.lights.get_mut(index) {
            Some(light) => {
                let new_position = Vector4::new(position.x, position.y, position.z, 1.0);
                let changed = light.position != new_position;
                light.position = new_position;
                changed
            }
            None => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Light> {
        self.lights.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block(&self) -> LightsBlock {
        let mut block = LightsBlock::zeroed();
        for (slot, light) in block.lights.iter_mut().zip(&self.lights) {
            *slot = light.raw();
        }
        block.count = self.lights.len() as u32;
        block
    }
}

/// Moves the first light along its orbit; other lights stay put
#[derive(Debug, Clone, Copy)]
pub struct LightAnimator {
    pub speed: f32,
}

impl Default for LightAnimator {
    fn default() -> Self {
        Self { speed: 0.5 }
    }
}

impl LightAnimator {
    pub fn position_at(&self, now: f32) -> Point3<f32> {
        let phase = self.speed * now;
        Point3::new(-phase.cos(), 2.0 + phase.sin(), 3.0 * phase.sin())
    }

    /// Returns true if any light moved
    pub fn animate(&self, lights: &mut LightSet, now: f32) -> bool {
        if lights.is_empty() {
            return false;
        }
        lights.set_position(0, self.position_at(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_past_capacity_is_an_error() {
        let mut lights = LightSet::new(2);
        lights.push(Light::new([0.0; 3], [1.0; 3])).unwrap();
        lights.push(Light::new([1.0; 3], [1.0; 3])).unwrap();
        let err = lights.push(Light::new([2.0; 3], [1.0; 3])).unwrap_err();
        assert!(matches!(err, RenderError::LightCapacity { capacity: 2 }));
        assert_eq!(lights.len(), 2);
    }

    #[test]
    fn test_capacity_cannot_drop_below_len() {
        let mut lights = LightSet::new(MAX_LIGHTS);
        lights.push(Light::new([0.0; 3], [1.0; 3])).unwrap();
        lights.push(Light::new([1.0; 3], [1.0; 3])).unwrap();

        let err = lights.set_capacity(1).unwrap_err();
        assert!(matches!(err, RenderError::LightCapacity { capacity: 1 }));
        assert_eq!(lights.capacity(), MAX_LIGHTS);

        lights.set_capacity(2).unwrap();
        assert!(lights.push(Light::new([2.0; 3], [1.0; 3])).is_err());

        assert!(lights.remove(0).is_some());
        assert!(lights.remove(5).is_none());
        assert_eq!(lights.get(0).unwrap().point(), Point3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_block_packs_lights_in_order() {
        let mut lights = LightSet::new(MAX_LIGHTS);
        lights.push(Light::new([-1.0, 1.5, 3.0], [0.7; 3])).unwrap();
        lights.push(Light::new([3.0, 3.0, -2.0], [0.7; 3])).unwrap();
        let block = lights.block();
        assert_eq!(block.count, 2);
        assert_eq!(block.lights[1].position, [3.0, 3.0, -2.0, 1.0]);
        assert_eq!(block.lights[2], LightRaw::zeroed());
        assert_eq!(std::mem::size_of::<LightsBlock>(), MAX_LIGHTS * 32 + 16);
    }

    #[test]
    fn test_animation_reports_movement() {
        let mut lights = LightSet::new(MAX_LIGHTS);
        lights.push(Light::new([-1.0, 1.5, 3.0], [0.7; 3])).unwrap();
        let animator = LightAnimator::default();
        assert!(animator.animate(&mut lights, 1.0));
        assert!(!animator.animate(&mut lights, 1.0));
        let p = lights.get(0).unwrap().point();
        assert!((p.y - (2.0 + 0.5f32.sin())).abs() < 1e-6);
    }
}
