// ============================================================================
// OPS: pixel and geometry operations behind the editing session
// ============================================================================
//
//   raster.rs     anti-aliased SDF fills and strokes on RgbaImage
//   filters.rs    separable Gaussian blur
//   shapes.rs     face bounds → default region shapes, regeneration policy
//   overlay.rs    region fill, outline and anchor handles
//   strands.rs    procedural hair strand brush
//   mask.rs       binary masks and the accent preview composite
//   submission.rs generation form, multipart encoding, backend replies
// ============================================================================

pub mod filters;
pub mod mask;
pub mod overlay;
pub mod raster;
pub mod shapes;
pub mod strands;
pub mod submission;
