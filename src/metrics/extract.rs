use crate::pose::{LandmarkIndex, Landmarks};

/// Upper bound for the shoulder/ear fallback neck estimate (degrees)
const FALLBACK_NECK_LIMIT_DEG: f64 = 85.0;
const MIN_REFERENCE_LENGTH: f64 = 1e-4;

/// Raw posture angles in degrees. `None` means unresolved this frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawMetrics {
    pub lean_deg: Option<f64>,
    pub neck_deg: Option<f64>,
    pub tilt_deg: Option<f64>,
}

impl RawMetrics {
    pub const UNKNOWN: RawMetrics = RawMetrics {
        lean_deg: None,
        neck_deg: None,
        tilt_deg: None,
    };
}

/// Unsigned angle between two 2D vectors in degrees (0 if either is degenerate)
pub fn angle_between(v1: (f64, f64), v2: (f64, f64)) -> f64 {
    let mag1 = v1.0.hypot(v1.1);
    let mag2 = v2.0.hypot(v2.1);
    if mag1 == 0.0 || mag2 == 0.0 {
        return 0.0;
    }
    let dot = v1.0 * v2.0 + v1.1 * v2.1;
    (dot / (mag1 * mag2)).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Extract lean/neck/tilt from one detection.
///
/// Never fails: any angle whose landmarks fall below `visibility_threshold`
/// comes back as `None`.
pub fn compute_metrics(
    landmarks: Option<&Landmarks>,
    visibility_threshold: f64,
    allow_upper_body_fallback: bool,
) -> RawMetrics {
    let Some(lm) = landmarks else {
        return RawMetrics::UNKNOWN;
    };

    RawMetrics {
        lean_deg: compute_lean(lm, visibility_threshold),
        neck_deg: compute_neck(lm, visibility_threshold, allow_upper_body_fallback),
        tilt_deg: compute_tilt(lm, visibility_threshold),
    }
}

fn shoulder_visibility(lm: &Landmarks) -> f64 {
    lm.visibility(LandmarkIndex::LeftShoulder)
        .min(lm.visibility(LandmarkIndex::RightShoulder))
}

fn compute_lean(lm: &Landmarks, threshold: f64) -> Option<f64> {
    use LandmarkIndex::*;
    let hip_vis = lm.visibility(LeftHip).min(lm.visibility(RightHip));
    if shoulder_visibility(lm) < threshold || hip_vis < threshold {
        return None;
    }

    let shoulder = lm.midpoint(LeftShoulder, RightShoulder);
    let hip = lm.midpoint(LeftHip, RightHip);
    let torso = (shoulder.0 - hip.0, shoulder.1 - hip.1);
    let angle = angle_between(torso, (0.0, -1.0));
    let sign = if torso.0 >= 0.0 { 1.0 } else { -1.0 };
    Some(sign * angle)
}

fn compute_neck(lm: &Landmarks, threshold: f64, allow_fallback: bool) -> Option<f64> {
    use LandmarkIndex::*;

    // Side with the better-seen ear; ties go left
    let (ear_idx, shoulder_idx, hip_idx) = if lm.visibility(LeftEar) >= lm.visibility(RightEar) {
        (LeftEar, LeftShoulder, LeftHip)
    } else {
        (RightEar, RightShoulder, RightHip)
    };
    let ear = lm.get(ear_idx);
    let shoulder = lm.get(shoulder_idx);
    let hip = lm.get(hip_idx);

    let side_vis = ear.visibility.min(shoulder.visibility).min(hip.visibility);
    if side_vis >= threshold {
        let v1 = (ear.x - shoulder.x, ear.y - shoulder.y);
        let v2 = (hip.x - shoulder.x, hip.y - shoulder.y);
        let forward = 180.0 - angle_between(v1, v2);
        let sign = if v1.0 >= 0.0 { 1.0 } else { -1.0 };
        return Some(sign * forward);
    }

    if !allow_fallback {
        return None;
    }

    let upper_vis = ear
        .visibility
        .min(shoulder.visibility)
        .min(shoulder_visibility(lm));
    if upper_vis < threshold {
        return None;
    }

    let shoulder_span = (lm.get(RightShoulder).x - lm.get(LeftShoulder).x).abs();
    let mut reference = (shoulder.y - ear.y).abs();
    if reference < MIN_REFERENCE_LENGTH {
        reference = shoulder_span;
    }
    let reference = reference.max(MIN_REFERENCE_LENGTH);

    let dx = ear.x - shoulder.x;
    let forward = dx.abs().atan2(reference).to_degrees();
    let sign = if dx >= 0.0 { 1.0 } else { -1.0 };
    Some(sign * forward.min(FALLBACK_NECK_LIMIT_DEG))
}

fn compute_tilt(lm: &Landmarks, threshold: f64) -> Option<f64> {
    if shoulder_visibility(lm) < threshold {
        return None;
    }
    let left = lm.get(LandmarkIndex::LeftShoulder);
    let right = lm.get(LandmarkIndex::RightShoulder);
    Some((right.y - left.y).atan2(right.x - left.x).to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Landmark;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn upright_body() -> Landmarks {
        let mut lm = Landmarks::default();
        lm.set(LandmarkIndex::LeftShoulder, Landmark::new(0.4, 0.4, 0.9));
        lm.set(LandmarkIndex::RightShoulder, Landmark::new(0.6, 0.4, 0.9));
        lm.set(LandmarkIndex::LeftHip, Landmark::new(0.4, 0.8, 0.9));
        lm.set(LandmarkIndex::RightHip, Landmark::new(0.6, 0.8, 0.9));
        lm.set(LandmarkIndex::LeftEar, Landmark::new(0.4, 0.2, 0.9));
        lm.set(LandmarkIndex::RightEar, Landmark::new(0.6, 0.2, 0.5));
        lm
    }

    #[test]
    fn test_no_landmarks_all_unknown() {
        assert_eq!(compute_metrics(None, 0.5, true), RawMetrics::UNKNOWN);
    }

    #[test]
    fn test_angle_between_degenerate() {
        assert_eq!(angle_between((0.0, 0.0), (1.0, 0.0)), 0.0);
        assert!(approx_eq(angle_between((1.0, 0.0), (0.0, 1.0)), 90.0, 1e-9));
        assert!(approx_eq(angle_between((1.0, 0.0), (-1.0, 0.0)), 180.0, 1e-9));
    }

    #[test]
    fn test_upright_is_zero() {
        let m = compute_metrics(Some(&upright_body()), 0.5, true);
        assert!(approx_eq(m.lean_deg.unwrap(), 0.0, 1e-9));
        assert!(approx_eq(m.neck_deg.unwrap(), 0.0, 1e-9));
        assert!(approx_eq(m.tilt_deg.unwrap(), 0.0, 1e-9));
    }

    #[test]
    fn test_lean_sign_follows_torso_x() {
        let mut lm = upright_body();
        // shoulders shifted +0.1 in x over a 0.4 tall torso
        lm.set(LandmarkIndex::LeftShoulder, Landmark::new(0.5, 0.4, 0.9));
        lm.set(LandmarkIndex::RightShoulder, Landmark::new(0.7, 0.4, 0.9));
        let right = compute_metrics(Some(&lm), 0.5, true).lean_deg.unwrap();
        assert!(approx_eq(right, 0.1f64.atan2(0.4).to_degrees(), 1e-9));

        lm.set(LandmarkIndex::LeftShoulder, Landmark::new(0.3, 0.4, 0.9));
        lm.set(LandmarkIndex::RightShoulder, Landmark::new(0.5, 0.4, 0.9));
        let left = compute_metrics(Some(&lm), 0.5, true).lean_deg.unwrap();
        assert!(approx_eq(left, -right, 1e-9));
    }

    #[test]
    fn test_lean_requires_hips() {
        let mut lm = upright_body();
        lm.set(LandmarkIndex::RightHip, Landmark::new(0.6, 0.8, 0.2));
        let m = compute_metrics(Some(&lm), 0.5, true);
        assert_eq!(m.lean_deg, None);
        assert!(m.tilt_deg.is_some());
    }

    #[test]
    fn test_neck_forward_head() {
        let mut lm = upright_body();
        lm.set(LandmarkIndex::LeftShoulder, Landmark::new(0.5, 0.5, 0.9));
        lm.set(LandmarkIndex::LeftHip, Landmark::new(0.5, 0.8, 0.9));
        lm.set(LandmarkIndex::LeftEar, Landmark::new(0.6, 0.3, 0.9));
        let neck = compute_metrics(Some(&lm), 0.5, true).neck_deg.unwrap();
        // ear vector (0.1, -0.2) against a vertical torso
        assert!(approx_eq(neck, 0.1f64.atan2(0.2).to_degrees(), 1e-9));
    }

    #[test]
    fn test_neck_uses_more_visible_ear() {
        let mut lm = upright_body();
        lm.set(LandmarkIndex::LeftEar, Landmark::new(0.3, 0.2, 0.6));
        lm.set(LandmarkIndex::RightEar, Landmark::new(0.6, 0.2, 0.95));
        let neck = compute_metrics(Some(&lm), 0.5, true).neck_deg.unwrap();
        assert!(approx_eq(neck, 0.0, 1e-9));
    }

    #[test]
    fn test_neck_falls_back_to_upper_body_when_hips_missing() {
        let mut lm = Landmarks::default();
        lm.set(LandmarkIndex::LeftShoulder, Landmark::new(0.45, 0.58, 1.0));
        lm.set(LandmarkIndex::RightShoulder, Landmark::new(0.55, 0.58, 1.0));
        lm.set(LandmarkIndex::LeftEar, Landmark::new(0.42, 0.40, 0.1));
        lm.set(LandmarkIndex::RightEar, Landmark::new(0.67, 0.40, 1.0));

        let m = compute_metrics(Some(&lm), 0.5, true);
        assert_eq!(m.lean_deg, None);
        let neck = m.neck_deg.unwrap();
        assert!(neck > 0.0);
        assert!(approx_eq(neck, 0.12f64.atan2(0.18).to_degrees(), 1e-9));
    }

    #[test]
    fn test_neck_requires_hips_when_fallback_disabled() {
        let mut lm = Landmarks::default();
        lm.set(LandmarkIndex::LeftShoulder, Landmark::new(0.45, 0.58, 1.0));
        lm.set(LandmarkIndex::RightShoulder, Landmark::new(0.55, 0.58, 1.0));
        lm.set(LandmarkIndex::RightEar, Landmark::new(0.67, 0.40, 1.0));

        let m = compute_metrics(Some(&lm), 0.5, false);
        assert_eq!(m.neck_deg, None);
    }

    #[test]
    fn test_fallback_neck_is_capped() {
        let mut lm = Landmarks::default();
        lm.set(LandmarkIndex::LeftShoulder, Landmark::new(0.45, 0.58, 1.0));
        lm.set(LandmarkIndex::RightShoulder, Landmark::new(0.55, 0.58, 1.0));
        // ear level with the shoulder: reference falls back to the shoulder span
        lm.set(LandmarkIndex::LeftEar, Landmark::new(-1.0, 0.58, 1.0));
        let neck = compute_metrics(Some(&lm), 0.5, true).neck_deg.unwrap();
        assert_eq!(neck, -FALLBACK_NECK_LIMIT_DEG);
    }

    #[test]
    fn test_tilt() {
        let mut lm = upright_body();
        lm.set(LandmarkIndex::RightShoulder, Landmark::new(0.6, 0.5, 0.9));
        let tilt = compute_metrics(Some(&lm), 0.5, true).tilt_deg.unwrap();
        assert!(approx_eq(tilt, 0.1f64.atan2(0.2).to_degrees(), 1e-9));
    }
}
