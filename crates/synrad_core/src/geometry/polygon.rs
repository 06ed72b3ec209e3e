//! 2-D polygon helpers in facet-local (u, v) coordinates.

use glam::DVec2;

/// Signed area by the shoelace formula (positive when counter-clockwise).
pub fn signed_area(poly: &[DVec2]) -> f64 {
    if poly.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, a) in poly.iter().enumerate() {
        let b = poly[(i + 1) % poly.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    0.5 * sum
}

pub fn area(poly: &[DVec2]) -> f64 {
    signed_area(poly).abs()
}

/// Winding number of `poly` around `p`. Non-zero means inside.
///
/// Works for concave outlines and either vertex order.
pub fn winding_number(poly: &[DVec2], p: DVec2) -> i32 {
    let mut wn = 0;
    for (i, a) in poly.iter().enumerate() {
        let b = poly[(i + 1) % poly.len()];
        let side = (b.x - a.x) * (p.y - a.y) - (p.x - a.x) * (b.y - a.y);
        if a.y <= p.y {
            if b.y > p.y && side > 0.0 {
                wn += 1;
            }
        } else if b.y <= p.y && side < 0.0 {
            wn -= 1;
        }
    }
    wn
}

pub fn contains_point(poly: &[DVec2], p: DVec2) -> bool {
    winding_number(poly, p) != 0
}

/// Clip `poly` to the axis-aligned rectangle `[min, max]` (Sutherland-Hodgman).
pub fn clip_to_rect(poly: &[DVec2], min: DVec2, max: DVec2) -> Vec<DVec2> {
    let mut out = poly.to_vec();
    // (axis, bound, keep when coordinate >= bound)
    let edges = [(0, min.x, true), (0, max.x, false), (1, min.y, true), (1, max.y, false)];
    for (axis, bound, keep_above) in edges {
        if out.is_empty() {
            break;
        }
        let inside = |q: DVec2| {
            if keep_above {
                q[axis] >= bound
            } else {
                q[axis] <= bound
            }
        };
        let input = std::mem::take(&mut out);
        for (i, &cur) in input.iter().enumerate() {
            let prev = input[(i + input.len() - 1) % input.len()];
            match (inside(prev), inside(cur)) {
                (true, true) => out.push(cur),
                (true, false) => out.push(crossing(prev, cur, axis, bound)),
                (false, true) => {
                    out.push(crossing(prev, cur, axis, bound));
                    out.push(cur);
                }
                (false, false) => {}
            }
        }
    }
    out
}

fn crossing(a: DVec2, b: DVec2, axis: usize, bound: f64) -> DVec2 {
    let t = (bound - a[axis]) / (b[axis] - a[axis]);
    a + (b - a) * t
}
