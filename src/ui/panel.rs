// src/ui/panel.rs
//! Read-only frame statistics panel

use crate::gfx::rendering::{FrameStats, ShadowState};

/// Text rows of the statistics panel, top to bottom
pub fn stats_lines(stats: &FrameStats) -> Vec<String> {
    let frame_ms = stats.frame_time.as_secs_f64() * 1000.0;
    let fps = if frame_ms > 0.0 { 1000.0 / frame_ms } else { 0.0 };
    let skipped = stats.frame.saturating_sub(stats.shadow_regenerations);
    let shadow_state = match stats.shadow_state {
        ShadowState::Valid => "valid",
        ShadowState::Dirty => "dirty",
    };

    vec![
        format!(
            "Viewport: {} x {}",
            stats.framebuffer_size.0, stats.framebuffer_size.1
        ),
        format!("Frame time: {:.2} ms ({:.0} fps)", frame_ms, fps),
        format!("Frame: {}", stats.frame),
        format!(
            "Shadow maps: {} regenerated, {} skipped ({})",
            stats.shadow_regenerations, skipped, shadow_state
        ),
        format!("Lights: {}", stats.lights),
        format!("Objects: {}", stats.objects),
    ]
}

/// Small panel in the top-left corner showing the latest frame statistics
///
/// Only reads the snapshot it is given; nothing flows back to the renderer.
pub fn stats_panel(ui: &imgui::Ui, stats: &FrameStats) {
    let display_size = ui.io().display_size;
    if display_size[0] <= 0.0 || display_size[1] <= 0.0 {
        return;
    }

    ui.window("Frame Statistics")
        .size([320.0, 170.0], imgui::Condition::FirstUseEver)
        .position([12.0, 12.0], imgui::Condition::FirstUseEver)
        .resizable(false)
        .collapsible(true)
        .build(|| {
            for line in stats_lines(stats) {
                ui.text(line);
            }
            if stats.reflection_captured {
                ui.text_disabled("Reflection cube captured this frame");
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stats() -> FrameStats {
        FrameStats {
            frame: 120,
            frame_time: Duration::from_millis(16),
            shadow_state: ShadowState::Valid,
            shadow_regenerations: 1,
            shadow_maps_rendered: false,
            reflection_captured: true,
            lights: 2,
            objects: 2,
            framebuffer_size: (1200, 800),
        }
    }

    #[test]
    fn test_stats_lines_show_viewport_and_shadow_counts() {
        let lines = stats_lines(&stats());
        assert_eq!(lines[0], "Viewport: 1200 x 800");
        assert!(lines[1].starts_with("Frame time: 16.00 ms"));
        assert_eq!(lines[3], "Shadow maps: 1 regenerated, 119 skipped (valid)");
        assert_eq!(lines[4], "Lights: 2");
    }

    #[test]
    fn test_stats_lines_before_first_frame() {
        let mut stats = stats();
        stats.frame = 0;
        stats.frame_time = Duration::ZERO;
        stats.shadow_regenerations = 0;
        stats.shadow_state = ShadowState::Dirty;

        let lines = stats_lines(&stats);
        assert!(lines[1].contains("(0 fps)"));
        assert_eq!(lines[3], "Shadow maps: 0 regenerated, 0 skipped (dirty)");
    }
}
