// projection.rs — 等距柱状投影 (equirectangular) 的 CPU 版本
//
// 与 shader.rs 中片元着色器的公式逐项对应，用于测试和宿主侧拾取。
// wgpu 的纹理坐标原点在左上角，v = 0 即图像第一行（天顶），
// 因此极角直接映射为 v，不需要 GL 上传时 flipY 那一步的 1 - v。

use glam::{Vec2, Vec3};
use std::f32::consts::PI;

/// Maps a direction (any length, from the sphere centre) to equirectangular
/// texture coordinates.
///
/// `u` wraps around the vertical axis with the seam at `-Z`, `v` runs from
/// the zenith (`0.0`) to the nadir (`1.0`).
pub fn equirect_uv(p: Vec3) -> Vec2 {
    // 方位角 [-π, π] -> u ∈ [0, 1]，接缝位于默认朝向 (+Z) 的背后
    let u = 0.5 - 0.5 * p.x.atan2(p.z) / PI;
    let xz = (p.x * p.x + p.z * p.z).sqrt();
    // 极角：从 "上" 极点量起
    let v = xz.atan2(p.y) / PI;
    Vec2::new(u, v)
}

/// Inverse of [`equirect_uv`]: unit direction for a texture coordinate.
pub fn equirect_direction(uv: Vec2) -> Vec3 {
    let azimuth = (0.5 - uv.x) * 2.0 * PI;
    let polar = uv.y * PI;
    let sin_p = polar.sin();
    Vec3::new(azimuth.sin() * sin_p, polar.cos(), azimuth.cos() * sin_p)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn poles_map_to_top_and_bottom_rows() {
        let north = equirect_uv(Vec3::Y);
        let south = equirect_uv(Vec3::NEG_Y);
        assert!(close(north.y, 0.0), "north v = {}", north.y);
        assert!(close(south.y, 1.0), "south v = {}", south.y);
    }

    #[test]
    fn projection_ignores_radius() {
        for r in [0.01f32, 1.0, 7.5, 500.0] {
            let uv = equirect_uv(Vec3::new(0.0, r, 0.0));
            assert_eq!(uv, equirect_uv(Vec3::Y));

            let dir = Vec3::new(0.3, -0.4, 0.8);
            let a = equirect_uv(dir);
            let b = equirect_uv(dir * r);
            assert!(close(a.x, b.x) && close(a.y, b.y), "r = {r}");
        }
    }

    #[test]
    fn default_forward_hits_image_centre() {
        let uv = equirect_uv(Vec3::Z);
        assert!(close(uv.x, 0.5));
        assert!(close(uv.y, 0.5));
    }

    #[test]
    fn seam_sits_behind_forward_direction() {
        let eps = 1e-3f32;
        let left = equirect_uv(Vec3::new((PI - eps).sin(), 0.0, (PI - eps).cos()));
        let right = equirect_uv(Vec3::new((-PI + eps).sin(), 0.0, (-PI + eps).cos()));

        // 两侧分别逼近 0 和 1，即纹理的环绕边界
        assert!(left.x < 0.001, "left u = {}", left.x);
        assert!(right.x > 0.999, "right u = {}", right.x);
        assert!((left.x + 1.0 - right.x).abs() < 0.001);
    }

    #[test]
    fn on_axis_directions_fall_back_to_centre_column() {
        assert!(close(equirect_uv(Vec3::Y).x, 0.5));
        assert!(close(equirect_uv(Vec3::NEG_Y).x, 0.5));
        // 原点：atan2(0, 0) = 0
        let origin = equirect_uv(Vec3::ZERO);
        assert!(close(origin.x, 0.5));
        assert!(close(origin.y, 0.0));
    }

    #[test]
    fn quarter_turns_land_on_quarter_columns() {
        assert!(close(equirect_uv(Vec3::X).x, 0.25));
        assert!(close(equirect_uv(Vec3::NEG_X).x, 0.75));
    }

    #[test]
    fn direction_inverts_uv() {
        for uv in [Vec2::new(0.1, 0.2), Vec2::new(0.5, 0.5), Vec2::new(0.9, 0.75)] {
            let back = equirect_uv(equirect_direction(uv));
            assert!((back - uv).length() < 1e-4, "{uv:?} -> {back:?}");
        }
    }
}
