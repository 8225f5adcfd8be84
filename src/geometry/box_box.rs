//! Narrow-phase collision between two oriented rectangles.
//!
//! Face-based separating-axis query followed by Sutherland-Hodgman clipping
//! of the incident edge, in the lineage of box2d-lite. Produces up to two
//! contact points whose [`FeaturePair`] ids stay stable while the boxes keep
//! touching along the same pair of edges, which is what makes the impulse
//! warmstart in the contact manifold work across frames.
//!
//! Box vertex and edge numbering:
//!
//! ```text
//!         ^ y
//!         |
//!         e1
//!    v2 ------ v1
//!     |        |
//!  e2 |        | e4  --> x
//!     |        |
//!    v3 ------ v4
//!         e3
//! ```

use crate::dynamics::Rigid;
use crate::math::{rotation, sign, Real, Vector2};

const NO_EDGE: u8 = 0;
const EDGE1: u8 = 1;
const EDGE2: u8 = 2;
const EDGE3: u8 = 3;
const EDGE4: u8 = 4;

/// Relative and absolute tolerances biasing the separating-axis choice, so
/// that nearly-square overlaps do not flip reference faces every frame.
const RELATIVE_TOL: Real = 0.95;
const ABSOLUTE_TOL: Real = 0.01;

/// Identifies a contact point by the clipped edges that produced it.
///
/// Two contacts from consecutive frames describe the same feature exactly
/// when their packed [`value`](Self::value)s are equal.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct FeaturePair {
    /// Incoming edge on the reference box.
    pub in_edge1: u8,
    /// Outgoing edge on the reference box.
    pub out_edge1: u8,
    /// Incoming edge on the incident box.
    pub in_edge2: u8,
    /// Outgoing edge on the incident box.
    pub out_edge2: u8,
}

impl FeaturePair {
    /// The four edge ids packed into a single 32-bit key.
    pub fn value(self) -> u32 {
        u32::from_le_bytes([self.in_edge1, self.out_edge1, self.in_edge2, self.out_edge2])
    }

    fn flip(&mut self) {
        core::mem::swap(&mut self.in_edge1, &mut self.in_edge2);
        core::mem::swap(&mut self.out_edge1, &mut self.out_edge2);
    }
}

/// One contact point produced by [`collide`].
///
/// `r_a` and `r_b` are the contact offsets in each body's local frame; the
/// manifold re-derives world positions and Jacobians from them every step.
/// The solver-facing fields (`j_*`, `c0`, `stick`) are filled in by the
/// owning manifold, not by the collision routine.
#[derive(Copy, Clone, Debug)]
pub struct Contact {
    /// Stable identity of this contact across frames.
    pub feature: FeaturePair,
    /// Contact offset in body A's local frame.
    pub r_a: Vector2,
    /// Contact offset in body B's local frame.
    pub r_b: Vector2,
    /// Contact normal in world space.
    pub normal: Vector2,

    /// Normal-row Jacobian with respect to body A.
    pub j_an: crate::math::Vector3,
    /// Normal-row Jacobian with respect to body B.
    pub j_bn: crate::math::Vector3,
    /// Tangent-row Jacobian with respect to body A.
    pub j_at: crate::math::Vector3,
    /// Tangent-row Jacobian with respect to body B.
    pub j_bt: crate::math::Vector3,
    /// Constraint value at the start of the step, in the (normal, tangent)
    /// basis, including the collision margin.
    pub c0: Vector2,
    /// `true` while the contact is held by static friction.
    pub stick: bool,
}

impl Default for Contact {
    fn default() -> Self {
        Self {
            feature: FeaturePair::default(),
            r_a: Vector2::zeros(),
            r_b: Vector2::zeros(),
            normal: Vector2::zeros(),
            j_an: crate::math::Vector3::zeros(),
            j_bn: crate::math::Vector3::zeros(),
            j_at: crate::math::Vector3::zeros(),
            j_bt: crate::math::Vector3::zeros(),
            c0: Vector2::zeros(),
            stick: false,
        }
    }
}

#[derive(Copy, Clone, PartialEq)]
enum Axis {
    FaceAX,
    FaceAY,
    FaceBX,
    FaceBY,
}

#[derive(Copy, Clone, Default)]
struct ClipVertex {
    v: Vector2,
    fp: FeaturePair,
}

fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vector2,
    offset: Real,
    clip_edge: u8,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut num_out = 0;

    // Signed distances of the segment endpoints to the clip line.
    let distance0 = normal.dot(&v_in[0].v) - offset;
    let distance1 = normal.dot(&v_in[1].v) - offset;

    if distance0 <= 0.0 {
        v_out[num_out] = v_in[0];
        num_out += 1;
    }
    if distance1 <= 0.0 {
        v_out[num_out] = v_in[1];
        num_out += 1;
    }

    // Endpoints on different sides: keep the intersection point.
    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        v_out[num_out].v = v_in[0].v + (v_in[1].v - v_in[0].v) * interp;
        if distance0 > 0.0 {
            v_out[num_out].fp = v_in[0].fp;
            v_out[num_out].fp.in_edge1 = clip_edge;
            v_out[num_out].fp.in_edge2 = NO_EDGE;
        } else {
            v_out[num_out].fp = v_in[1].fp;
            v_out[num_out].fp.out_edge1 = clip_edge;
            v_out[num_out].fp.out_edge2 = NO_EDGE;
        }
        num_out += 1;
    }

    (v_out, num_out)
}

fn compute_incident_edge(
    h: Vector2,
    pos: Vector2,
    rot: &crate::math::Matrix2,
    normal: Vector2,
) -> [ClipVertex; 2] {
    let mut c = [ClipVertex::default(); 2];

    // The reference normal, expressed in the incident box's frame and
    // flipped so it points into that box.
    let n = -(rot.transpose() * normal);
    let n_abs = n.abs();

    if n_abs.x > n_abs.y {
        if sign(n.x) > 0.0 {
            c[0].v = Vector2::new(h.x, -h.y);
            c[0].fp.in_edge2 = EDGE3;
            c[0].fp.out_edge2 = EDGE4;

            c[1].v = Vector2::new(h.x, h.y);
            c[1].fp.in_edge2 = EDGE4;
            c[1].fp.out_edge2 = EDGE1;
        } else {
            c[0].v = Vector2::new(-h.x, h.y);
            c[0].fp.in_edge2 = EDGE1;
            c[0].fp.out_edge2 = EDGE2;

            c[1].v = Vector2::new(-h.x, -h.y);
            c[1].fp.in_edge2 = EDGE2;
            c[1].fp.out_edge2 = EDGE3;
        }
    } else if sign(n.y) > 0.0 {
        c[0].v = Vector2::new(h.x, h.y);
        c[0].fp.in_edge2 = EDGE4;
        c[0].fp.out_edge2 = EDGE1;

        c[1].v = Vector2::new(-h.x, h.y);
        c[1].fp.in_edge2 = EDGE1;
        c[1].fp.out_edge2 = EDGE2;
    } else {
        c[0].v = Vector2::new(-h.x, -h.y);
        c[0].fp.in_edge2 = EDGE2;
        c[0].fp.out_edge2 = EDGE3;

        c[1].v = Vector2::new(h.x, -h.y);
        c[1].fp.in_edge2 = EDGE3;
        c[1].fp.out_edge2 = EDGE4;
    }

    c[0].v = pos + rot * c[0].v;
    c[1].v = pos + rot * c[1].v;
    c
}

/// Computes up to two contact points between two oriented rectangles.
///
/// Returns the number of contacts written to `contacts`. The stored normal
/// points from body B towards body A, so the normal-row Jacobian on A is the
/// normal itself and on B its negation.
pub fn collide(body_a: &Rigid, body_b: &Rigid, contacts: &mut [Contact; 2]) -> usize {
    let h_a = body_a.size * 0.5;
    let h_b = body_b.size * 0.5;

    let pos_a = body_a.position.xy();
    let pos_b = body_b.position.xy();

    let rot_a = rotation(body_a.position.z);
    let rot_b = rotation(body_b.position.z);

    let rot_a_t = rot_a.transpose();
    let rot_b_t = rot_b.transpose();

    let dp = pos_b - pos_a;
    let d_a = rot_a_t * dp;
    let d_b = rot_b_t * dp;

    let c = rot_a_t * rot_b;
    let abs_c = c.abs();
    let abs_c_t = abs_c.transpose();

    // Face separations; any positive component is a separating axis.
    let face_a = d_a.abs() - h_a - abs_c * h_b;
    if face_a.x > 0.0 || face_a.y > 0.0 {
        return 0;
    }

    let face_b = d_b.abs() - abs_c_t * h_a - h_b;
    if face_b.x > 0.0 || face_b.y > 0.0 {
        return 0;
    }

    // Pick the reference axis, biased towards keeping the current winner.
    let mut axis = Axis::FaceAX;
    let mut separation = face_a.x;
    let mut normal = if d_a.x > 0.0 {
        rot_a.column(0).into_owned()
    } else {
        -rot_a.column(0)
    };

    if face_a.y > RELATIVE_TOL * separation + ABSOLUTE_TOL * h_a.y {
        axis = Axis::FaceAY;
        separation = face_a.y;
        normal = if d_a.y > 0.0 {
            rot_a.column(1).into_owned()
        } else {
            -rot_a.column(1)
        };
    }

    if face_b.x > RELATIVE_TOL * separation + ABSOLUTE_TOL * h_b.x {
        axis = Axis::FaceBX;
        separation = face_b.x;
        normal = if d_b.x > 0.0 {
            rot_b.column(0).into_owned()
        } else {
            -rot_b.column(0)
        };
    }

    if face_b.y > RELATIVE_TOL * separation + ABSOLUTE_TOL * h_b.y {
        axis = Axis::FaceBY;
        normal = if d_b.y > 0.0 {
            rot_b.column(1).into_owned()
        } else {
            -rot_b.column(1)
        };
    }

    // Clipping setup: the reference face plane, its two side planes, and the
    // incident edge on the other box.
    let (front_normal, front, side_normal, neg_side, pos_side, neg_edge, pos_edge) = match axis {
        Axis::FaceAX => {
            let front_normal = normal;
            let side_normal = rot_a.column(1).into_owned();
            let side = pos_a.dot(&side_normal);
            (
                front_normal,
                pos_a.dot(&front_normal) + h_a.x,
                side_normal,
                -side + h_a.y,
                side + h_a.y,
                EDGE3,
                EDGE1,
            )
        }
        Axis::FaceAY => {
            let front_normal = normal;
            let side_normal = rot_a.column(0).into_owned();
            let side = pos_a.dot(&side_normal);
            (
                front_normal,
                pos_a.dot(&front_normal) + h_a.y,
                side_normal,
                -side + h_a.x,
                side + h_a.x,
                EDGE2,
                EDGE4,
            )
        }
        Axis::FaceBX => {
            let front_normal = -normal;
            let side_normal = rot_b.column(1).into_owned();
            let side = pos_b.dot(&side_normal);
            (
                front_normal,
                pos_b.dot(&front_normal) + h_b.x,
                side_normal,
                -side + h_b.y,
                side + h_b.y,
                EDGE3,
                EDGE1,
            )
        }
        Axis::FaceBY => {
            let front_normal = -normal;
            let side_normal = rot_b.column(0).into_owned();
            let side = pos_b.dot(&side_normal);
            (
                front_normal,
                pos_b.dot(&front_normal) + h_b.y,
                side_normal,
                -side + h_b.x,
                side + h_b.x,
                EDGE2,
                EDGE4,
            )
        }
    };

    let incident_edge = match axis {
        Axis::FaceAX | Axis::FaceAY => compute_incident_edge(h_b, pos_b, &rot_b, front_normal),
        Axis::FaceBX | Axis::FaceBY => compute_incident_edge(h_a, pos_a, &rot_a, front_normal),
    };

    // Clip the incident edge against the two side planes of the reference
    // face. Roundoff can eat both points, in which case there is no contact.
    let (clip_points1, np) = clip_segment_to_line(&incident_edge, -side_normal, neg_side, neg_edge);
    if np < 2 {
        return 0;
    }

    let (clip_points2, np) = clip_segment_to_line(&clip_points1, side_normal, pos_side, pos_edge);
    if np < 2 {
        return 0;
    }

    let mut num_contacts = 0;
    for clip in &clip_points2 {
        let separation = front_normal.dot(&clip.v) - front;
        if separation <= 0.0 {
            let contact = &mut contacts[num_contacts];
            *contact = Contact::default();
            contact.normal = -normal;
            // Slide the contact point onto the reference face.
            contact.r_a = rot_a_t * (clip.v - front_normal * separation - pos_a);
            contact.r_b = rot_b_t * (clip.v - pos_b);
            contact.feature = clip.fp;

            if axis == Axis::FaceBX || axis == Axis::FaceBY {
                contact.feature.flip();
                contact.r_a = rot_a_t * (clip.v - pos_a);
                contact.r_b = rot_b_t * (clip.v - front_normal * separation - pos_b);
            }
            num_contacts += 1;
        }
    }

    num_contacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{transform, Vector3};
    use approx::assert_relative_eq;

    fn rigid_box(size: Vector2, position: Vector3) -> Rigid {
        Rigid::new(size, 1.0, 0.5, position, Vector3::zeros())
    }

    #[test]
    fn separated_boxes_produce_no_contacts() {
        let a = rigid_box(Vector2::new(1.0, 1.0), Vector3::zeros());
        let b = rigid_box(Vector2::new(1.0, 1.0), Vector3::new(3.0, 0.0, 0.0));
        let mut contacts = [Contact::default(); 2];
        assert_eq!(collide(&a, &b, &mut contacts), 0);
    }

    #[test]
    fn stacked_boxes_produce_two_contacts_with_vertical_normal() {
        let a = rigid_box(Vector2::new(2.0, 1.0), Vector3::zeros());
        let b = rigid_box(Vector2::new(1.0, 1.0), Vector3::new(0.0, 0.99, 0.0));
        let mut contacts = [Contact::default(); 2];
        let n = collide(&a, &b, &mut contacts);
        assert_eq!(n, 2);

        for contact in &contacts[..n] {
            // Stored normal points from B towards A; B sits on top.
            assert_relative_eq!(contact.normal, Vector2::new(0.0, -1.0), epsilon = 1.0e-5);

            let world_a = transform(a.position, contact.r_a);
            let world_b = transform(b.position, contact.r_b);
            assert!((world_a - world_b).norm() < 0.05);
        }
    }

    #[test]
    fn feature_ids_are_distinct_per_contact_and_stable() {
        let a = rigid_box(Vector2::new(2.0, 1.0), Vector3::zeros());
        let b = rigid_box(Vector2::new(1.0, 1.0), Vector3::new(0.1, 0.98, 0.0));
        let mut first = [Contact::default(); 2];
        let n1 = collide(&a, &b, &mut first);
        assert_eq!(n1, 2);
        assert_ne!(first[0].feature.value(), first[1].feature.value());

        // A tiny slide along the face keeps the same edge pairing.
        let b2 = rigid_box(Vector2::new(1.0, 1.0), Vector3::new(0.11, 0.98, 0.0));
        let mut second = [Contact::default(); 2];
        let n2 = collide(&a, &b2, &mut second);
        assert_eq!(n2, 2);
        assert_eq!(first[0].feature.value(), second[0].feature.value());
        assert_eq!(first[1].feature.value(), second[1].feature.value());
    }

    #[test]
    fn swapping_arguments_flips_normals_and_keeps_positions() {
        let a = rigid_box(Vector2::new(2.0, 1.0), Vector3::new(0.0, 0.0, 0.05));
        let b = rigid_box(Vector2::new(1.0, 1.0), Vector3::new(0.2, 0.97, 0.0));

        let mut ab = [Contact::default(); 2];
        let mut ba = [Contact::default(); 2];
        let n_ab = collide(&a, &b, &mut ab);
        let n_ba = collide(&b, &a, &mut ba);
        assert_eq!(n_ab, n_ba);
        assert!(n_ab > 0);

        for i in 0..n_ab {
            assert_relative_eq!(ab[i].normal, -ba[i].normal, epsilon = 1.0e-4);
        }

        // The contact sets describe the same world locations, up to the
        // shallow penetration depth used to slide points onto the
        // reference face. In the reversed call the second body is `a`, so
        // its offsets live in `a`'s frame.
        for contact in &ab[..n_ab] {
            let p = transform(a.position, contact.r_a);
            let closest = ba[..n_ba]
                .iter()
                .map(|other| (transform(a.position, other.r_b) - p).norm())
                .fold(Real::INFINITY, Real::min);
            assert!(closest < 0.05, "unmatched contact point: {closest}");
        }
    }

    #[test]
    fn feature_pair_packs_all_four_edges() {
        let fp = FeaturePair {
            in_edge1: 1,
            out_edge1: 2,
            in_edge2: 3,
            out_edge2: 4,
        };
        assert_eq!(fp.value(), u32::from_le_bytes([1, 2, 3, 4]));

        let mut flipped = fp;
        flipped.flip();
        assert_eq!(
            flipped,
            FeaturePair {
                in_edge1: 3,
                out_edge1: 4,
                in_edge2: 1,
                out_edge2: 2,
            }
        );
    }
}
