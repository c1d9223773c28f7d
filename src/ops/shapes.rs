use egui::{Pos2, Vec2, pos2, vec2};
use serde::{Deserialize, Serialize};

/// A user-adjustable control coordinate in image-native pixels.
pub type AnchorPoint = Pos2;

/// Face rectangle reported by the detector, in image-native pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceBounds {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub center_x: f32,
}

/// Which scalp region is being defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PatternKind {
    #[default]
    Hairline,
    Crown,
    MidCrown,
    FullScalp,
}

impl PatternKind {
    /// Value sent as `hair_line_type`.
    pub fn wire_name(self) -> &'static str {
        match self {
            PatternKind::Hairline => "Hairline",
            PatternKind::Crown => "Crown",
            PatternKind::MidCrown => "Mid Crown",
            PatternKind::FullScalp => "Full Scalp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-', '_'], "").as_str() {
            "hairline" => Some(PatternKind::Hairline),
            "crown" => Some(PatternKind::Crown),
            "midcrown" => Some(PatternKind::MidCrown),
            "fullscalp" => Some(PatternKind::FullScalp),
            _ => None,
        }
    }

    pub fn all() -> &'static [PatternKind] {
        &[PatternKind::Hairline, PatternKind::Crown, PatternKind::MidCrown, PatternKind::FullScalp]
    }
}

/// Front hairline outline, only meaningful for [`PatternKind::Hairline`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum HairlineDesign {
    #[default]
    MPattern,
    ZPattern,
    Curve,
}

impl HairlineDesign {
    /// Value sent as `hairline_pattern`.
    pub fn wire_name(self) -> &'static str {
        match self {
            HairlineDesign::MPattern => "M Pattern",
            HairlineDesign::ZPattern => "Z Pattern",
            HairlineDesign::Curve => "Curve",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-', '_'], "").as_str() {
            "m" | "mpattern" => Some(HairlineDesign::MPattern),
            "z" | "zpattern" => Some(HairlineDesign::ZPattern),
            "curve" => Some(HairlineDesign::Curve),
            _ => None,
        }
    }
}

/// Geometry of the selected region.
#[derive(Clone, Debug, PartialEq)]
pub enum RegionShape {
    /// Five-point inner line with a parallel outer line above it.
    BandedCurve { inner: [AnchorPoint; 5], outer: [AnchorPoint; 5] },
    /// Two temple pairs at different heights.
    ZPattern { inner: [AnchorPoint; 4], outer: [AnchorPoint; 4] },
    CircularRegion {
        center: AnchorPoint,
        right: AnchorPoint,
        left: AnchorPoint,
        top: AnchorPoint,
        bottom: AnchorPoint,
    },
}

impl RegionShape {
    /// Every anchor in hit-test order: inner then outer for banded shapes;
    /// center, right, left, top, bottom for circles.
    pub fn anchors(&self) -> Vec<AnchorPoint> {
        match self {
            RegionShape::BandedCurve { inner, outer } => inner.iter().chain(outer).copied().collect(),
            RegionShape::ZPattern { inner, outer } => inner.iter().chain(outer).copied().collect(),
            RegionShape::CircularRegion { center, right, left, top, bottom } => {
                vec![*center, *right, *left, *top, *bottom]
            }
        }
    }

    /// Mutable access to a banded anchor by flat index. Circles return `None`
    /// because their points are never moved individually.
    pub fn banded_anchor_mut(&mut self, index: usize) -> Option<&mut AnchorPoint> {
        match self {
            RegionShape::BandedCurve { inner, outer } => {
                let n = inner.len();
                if index < n { inner.get_mut(index) } else { outer.get_mut(index - n) }
            }
            RegionShape::ZPattern { inner, outer } => {
                let n = inner.len();
                if index < n { inner.get_mut(index) } else { outer.get_mut(index - n) }
            }
            RegionShape::CircularRegion { .. } => None,
        }
    }

    /// Mean of the horizontal and vertical radius, as drawn by the overlay.
    pub fn average_radius(&self) -> Option<f32> {
        match self {
            RegionShape::CircularRegion { center, right, top, .. } => {
                Some(((right.x - center.x).abs() + (top.y - center.y).abs()) / 2.0)
            }
            _ => None,
        }
    }

    /// `(inner, outer)` lists, as submitted in `hairline_points`.
    pub fn inner_outer(&self) -> (Vec<AnchorPoint>, Vec<AnchorPoint>) {
        match self {
            RegionShape::BandedCurve { inner, outer } => (inner.to_vec(), outer.to_vec()),
            RegionShape::ZPattern { inner, outer } => (inner.to_vec(), outer.to_vec()),
            RegionShape::CircularRegion { .. } => (self.anchors(), Vec::new()),
        }
    }
}

/// Circle with all four edge points at `radius` around `center`.
pub fn circle_around(center: AnchorPoint, radius: f32) -> RegionShape {
    circle_with_radii(center, radius, radius)
}

fn circle_with_radii(center: AnchorPoint, rx: f32, ry: f32) -> RegionShape {
    RegionShape::CircularRegion {
        center,
        right: center + vec2(rx, 0.0),
        left: center - vec2(rx, 0.0),
        top: center - vec2(0.0, ry),
        bottom: center + vec2(0.0, ry),
    }
}

fn offset_all<const N: usize>(points: [Pos2; N], by: Vec2) -> [Pos2; N] {
    points.map(|p| p + by)
}

/// Default region for a face. `design` is ignored unless `kind` is Hairline.
pub fn default_shape(face: &FaceBounds, kind: PatternKind, design: HairlineDesign) -> RegionShape {
    let (l, r, t, w, h, cx) = (face.left, face.right, face.top, face.width, face.height, face.center_x);
    match kind {
        PatternKind::Hairline => match design {
            HairlineDesign::MPattern => {
                let inner = [
                    pos2(l + 0.1 * w, t - 20.0),
                    pos2(l + 0.25 * w, t - 40.0),
                    pos2(cx, t - 10.0),
                    pos2(r - 0.25 * w, t - 40.0),
                    pos2(r - 0.1 * w, t - 20.0),
                ];
                RegionShape::BandedCurve { inner, outer: offset_all(inner, vec2(-15.0, -15.0)) }
            }
            HairlineDesign::Curve => {
                let inner = [
                    pos2(l + 0.1 * w, t - 20.0),
                    pos2(l + 0.3 * w, t - 15.0),
                    pos2(cx, t - 10.0),
                    pos2(r - 0.3 * w, t - 15.0),
                    pos2(r - 0.1 * w, t - 20.0),
                ];
                RegionShape::BandedCurve { inner, outer: offset_all(inner, vec2(-15.0, -15.0)) }
            }
            HairlineDesign::ZPattern => {
                let inner = [
                    pos2(l + 0.15 * w, t - 25.0),
                    pos2(r - 0.15 * w, t - 25.0),
                    pos2(l + 0.2 * w, t - 5.0),
                    pos2(r - 0.2 * w, t - 5.0),
                ];
                RegionShape::ZPattern { inner, outer: offset_all(inner, vec2(-10.0, -10.0)) }
            }
        },
        PatternKind::Crown => circle_with_radii(pos2(cx, t - 0.5 * w), 0.4 * w, 0.25 * w),
        PatternKind::MidCrown => circle_around(pos2(cx, t - 0.5 * w), 0.2 * w),
        PatternKind::FullScalp => circle_with_radii(pos2(cx, t - 0.6 * h), 0.6 * w, 0.9 * h),
    }
}

// ============================================================================
// REGION STATE: regeneration policy
// ============================================================================

/// Active region selection for one image.
#[derive(Clone, Debug, Default)]
pub struct RegionState {
    pub kind: PatternKind,
    pub design: HairlineDesign,
    face: Option<FaceBounds>,
    shape: Option<RegionShape>,
    /// Set once the user drags any anchor of the current kind/design.
    user_edited: bool,
}

impl RegionState {
    pub fn new(kind: PatternKind, design: HairlineDesign) -> Self {
        Self { kind, design, ..Self::default() }
    }

    pub fn shape(&self) -> Option<&RegionShape> {
        self.shape.as_ref()
    }

    pub fn shape_mut(&mut self) -> Option<&mut RegionShape> {
        self.shape.as_mut()
    }

    pub fn face(&self) -> Option<&FaceBounds> {
        self.face.as_ref()
    }

    pub fn mark_edited(&mut self) {
        self.user_edited = true;
    }

    pub fn is_user_edited(&self) -> bool {
        self.user_edited
    }

    /// Reconcile with current inputs. Returns true when the shape was
    /// (re)generated.
    ///
    /// Kind/design changes always regenerate. New face bounds regenerate
    /// only while the user has not dragged anything; otherwise the dragged
    /// anchors survive re-renders.
    pub fn sync(&mut self, face: Option<FaceBounds>, kind: PatternKind, design: HairlineDesign) -> bool {
        let selection_changed = kind != self.kind || (kind == PatternKind::Hairline && design != self.design);
        self.kind = kind;
        self.design = design;
        if selection_changed {
            self.user_edited = false;
            self.shape = None;
        }

        let face_changed = face != self.face;
        self.face = face;

        let Some(face) = face else {
            if self.shape.is_none() {
                crate::log_warn!("region sync: no face bounds yet, nothing to generate");
            }
            return false;
        };

        let must_generate = self.shape.is_none() || (face_changed && !self.user_edited);
        if must_generate {
            self.shape = Some(default_shape(&face, kind, design));
            self.user_edited = false;
        }
        must_generate
    }

    /// Forget the region entirely (new image).
    pub fn reset(&mut self) {
        self.face = None;
        self.shape = None;
        self.user_edited = false;
    }
}
