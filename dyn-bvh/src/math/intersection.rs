use super::{closest_point, Ray, Sphere, AABB};

/// Determines the intersection between the given AABB and ray. If there is an intersection it
/// returned the coefficient f that defines the intersection point along the given ray.
/// That is, ray.pos + f * ray.dir is the intersection point
///
/// # Arguments
/// * `aabb` - The AABB to compute the intersection with.
/// * `ray` - The ray to compute the intersection with.
/// * `max_f` - Optionally, the maximum value for f. If the intersection point is further away
///             than max_f, None is returned.
pub fn aabb_ray(aabb: &AABB, ray: &Ray, max_f: Option<f32>) -> Option<f32> {
    if aabb.is_empty() {
        return None;
    }

    let mut t_min = 0f32;
    let mut t_max = max_f.unwrap_or(f32::MAX);

    // we iterate over each axis and determine the intersection point with the AABB
    for axis in 0..3 {
        // A ray parallel to the slab can only hit if its origin lies between the two planes.
        if ray.dir[axis] == 0f32 {
            if ray.pos[axis] < aabb.min[axis] || ray.pos[axis] > aabb.max[axis] {
                return None;
            }

            continue;
        }

        let t0 = (aabb.min[axis] - ray.pos[axis]) / ray.dir[axis];
        let t1 = (aabb.max[axis] - ray.pos[axis]) / ray.dir[axis];

        t_min = t_min.max(t0.min(t1));
        t_max = t_max.min(t0.max(t1));

        if t_min > t_max {
            return None;
        }
    }

    Some(t_min)
}

/// Returns true if both boxes overlap. Boxes that only touch count as overlapping.
///
/// # Arguments
/// * `a` - The first box.
/// * `b` - The second box.
#[inline]
pub fn aabb_aabb(a: &AABB, b: &AABB) -> bool {
    !a.is_empty()
        && !b.is_empty()
        && a.min.x <= b.max.x
        && b.min.x <= a.max.x
        && a.min.y <= b.max.y
        && b.min.y <= a.max.y
        && a.min.z <= b.max.z
        && b.min.z <= a.max.z
}

/// Returns true if the sphere touches or overlaps the box.
///
/// # Arguments
/// * `sphere` - The sphere to test.
/// * `aabb` - The box to test.
#[inline]
pub fn sphere_aabb(sphere: &Sphere, aabb: &AABB) -> bool {
    if aabb.is_empty() {
        return false;
    }

    let p = closest_point(aabb, &sphere.center);
    nalgebra_glm::distance2(&p, &sphere.center) <= sphere.radius * sphere.radius
}
