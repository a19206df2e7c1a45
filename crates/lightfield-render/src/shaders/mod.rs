//! WGSL sources for every program
//!
//! Each program is compiled as `common.wgsl` followed by its own file, so
//! the uniform block and octahedral helpers have a single definition.

use crate::gpu::Program;

pub const COMMON: &str = include_str!("../../shaders/common.wgsl");

fn program_source(program: Program) -> &'static str {
    match program {
        Program::Shading => include_str!("../../shaders/shading.wgsl"),
        Program::Precompute => include_str!("../../shaders/precompute.wgsl"),
        Program::ShadowDepth => include_str!("../../shaders/shadow_depth.wgsl"),
        Program::ProbeMarker => include_str!("../../shaders/probe_marker.wgsl"),
        Program::Environment => include_str!("../../shaders/environment.wgsl"),
        Program::OctahedralProject => include_str!("../../shaders/octahedral.wgsl"),
        Program::TextureBlit => include_str!("../../shaders/texture_blit.wgsl"),
    }
}

/// Full WGSL module for `program`
pub fn source(program: Program) -> String {
    let own = program_source(program);
    let mut out = String::with_capacity(COMMON.len() + own.len() + 1);
    out.push_str(COMMON);
    out.push('\n');
    out.push_str(own);
    out
}

pub const VERTEX_ENTRY: &str = "vs_main";

/// Fragment entry point matching the colour targets a pass binds.
///
/// Programs drawn both on screen and into probe captures have a capture
/// variant writing radiance+distance and normals. The octahedral program
/// has a distance-only variant for the low resolution atlas.
pub fn fragment_entry(program: Program, color_targets: usize) -> &'static str {
    match (program, color_targets) {
        (Program::ProbeMarker | Program::Environment, 2) => "fs_capture",
        (Program::OctahedralProject, 2) => "fs_low",
        _ => "fs_main",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_program_has_entry_points() {
        for program in Program::ALL {
            let src = source(program);
            assert!(src.contains("struct DrawUniforms"));
            assert!(src.contains(&format!("fn {}(", VERTEX_ENTRY)), "{}", program.name());
            assert!(src.contains("fn fs_main("), "{}", program.name());
        }
    }

    #[test]
    fn capture_variants_exist_where_selected() {
        for program in Program::ALL {
            let entry = fragment_entry(program, 2);
            assert!(source(program).contains(&format!("fn {}(", entry)), "{}", program.name());
        }
        assert_eq!(fragment_entry(Program::OctahedralProject, 3), "fs_main");
        assert_eq!(fragment_entry(Program::Environment, 1), "fs_main");
    }
}
