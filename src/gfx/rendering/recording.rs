//! Backend that records commands instead of executing them
//!
//! Used to inspect what the stages submit: pass order, draw counts and the
//! exact bytes written to shared buffers. Runs without a GPU.

use crate::error::Result;
use crate::gfx::rendering::backend::{PassRecord, Program, RenderBackend, SharedBuffer};
use crate::gfx::rendering::registry::{ResourceRegistry, TargetHandle};
use crate::gfx::scene::Scene;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Prepare { targets: usize, objects: usize },
    Write { buffer: SharedBuffer, bytes: Vec<u8> },
    Pass(PassRecord),
    Resize(Vec<TargetHandle>),
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    commands: Vec<Command>,
}

impl RecordingBackend {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn passes(&self) -> impl Iterator<Item = &PassRecord> {
        self.commands.iter().filter_map(|command| match command {
            Command::Pass(pass) => Some(pass),
            _ => None,
        })
    }

    pub fn pass_count(&self, program: Program) -> usize {
        self.passes().filter(|pass| pass.program == program).count()
    }

    /// Number of draw items issued by passes of `program`
    pub fn draw_count(&self, program: Program) -> usize {
        self.passes()
            .filter(|pass| pass.program == program)
            .map(|pass| pass.draws.len())
            .sum()
    }

    /// Programs of all recorded passes, in submission order
    pub fn program_sequence(&self) -> Vec<Program> {
        self.passes().map(|pass| pass.program).collect()
    }

    pub fn writes_to(&self, buffer: SharedBuffer) -> Vec<Vec<u8>> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::Write { buffer: b, bytes } if *b == buffer => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn transform_writes(&self) -> Vec<Vec<u8>> {
        self.writes_to(SharedBuffer::Transform)
    }

    pub fn last_write(&self, buffer: SharedBuffer) -> Option<Vec<u8>> {
        self.writes_to(buffer).pop()
    }
}

impl RenderBackend for RecordingBackend {
    fn prepare(&mut self, registry: &ResourceRegistry, scene: &Scene) -> Result<()> {
        self.commands.push(Command::Prepare {
            targets: registry.len(),
            objects: scene.objects.len(),
        });
        Ok(())
    }

    fn write_buffer(&mut self, buffer: SharedBuffer, bytes: &[u8]) {
        self.commands.push(Command::Write {
            buffer,
            bytes: bytes.to_vec(),
        });
    }

    fn execute(&mut self, pass: &PassRecord) {
        self.commands.push(Command::Pass(pass.clone()));
    }

    fn targets_resized(&mut self, _registry: &ResourceRegistry, handles: &[TargetHandle]) {
        self.commands.push(Command::Resize(handles.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::rendering::backend::DrawItem;

    #[test]
    fn test_records_in_call_order() {
        let mut backend = RecordingBackend::default();
        backend.write_buffer(SharedBuffer::Transform, &[1, 2, 3]);
        backend.execute(&PassRecord::new("a", Program::DepthNormal).draw_objects([0, 1]));
        backend.write_buffer(SharedBuffer::Transform, &[4]);
        backend.execute(&PassRecord::new("b", Program::Occlusion).draw(DrawItem::Fullscreen));

        assert_eq!(
            backend.program_sequence(),
            vec![Program::DepthNormal, Program::Occlusion]
        );
        assert_eq!(backend.transform_writes(), vec![vec![1, 2, 3], vec![4]]);
        assert_eq!(backend.draw_count(Program::DepthNormal), 2);
        assert!(matches!(backend.commands()[2], Command::Write { .. }));
    }
}
