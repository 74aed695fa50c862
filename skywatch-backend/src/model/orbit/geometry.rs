//! Earth frames, WGS84 geodesy and a low-precision solar ephemeris.
//!
//! Inertial vectors are TEME as produced by SGP4, in kilometres. The solar
//! position is good to about 0.01 degrees between 1950 and 2050.

use chrono::{DateTime, Utc};
use skywatch_common::Observer;

pub type Vec3 = [f64; 3];

pub const EARTH_RADIUS_KM: f64 = 6378.137;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);
const AU_KM: f64 = 149_597_870.7;
const J2000_JD: f64 = 2_451_545.0;
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

pub fn julian_date(t: DateTime<Utc>) -> f64 {
    let seconds = t.timestamp() as f64 + t.timestamp_subsec_nanos() as f64 / 1e9;
    UNIX_EPOCH_JD + seconds / 86_400.0
}

/// Greenwich mean sidereal time in radians (IAU 1982).
pub fn gmst(t: DateTime<Utc>) -> f64 {
    let tu = (julian_date(t) - J2000_JD) / 36_525.0;
    let seconds = 67_310.548_41
        + (876_600.0 * 3600.0 + 8_640_184.812_866) * tu
        + 0.093_104 * tu * tu
        - 6.2e-6 * tu * tu * tu;
    (seconds.rem_euclid(86_400.0) / 240.0).to_radians()
}

/// Rotate an inertial vector into the Earth-fixed frame.
pub fn teme_to_ecef(r: Vec3, t: DateTime<Utc>) -> Vec3 {
    let (sin_g, cos_g) = gmst(t).sin_cos();
    [cos_g * r[0] + sin_g * r[1], -sin_g * r[0] + cos_g * r[1], r[2]]
}

/// Geodetic latitude (deg), longitude (deg, -180..180) and height (km).
pub fn ecef_to_geodetic(r: Vec3) -> (f64, f64, f64) {
    let lon = r[1].atan2(r[0]);
    let p = r[0].hypot(r[1]);

    let mut lat = r[2].atan2(p * (1.0 - WGS84_E2));
    let mut height = 0.0;
    for _ in 0..6 {
        let sin_lat = lat.sin();
        let n = EARTH_RADIUS_KM / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        height = p / lat.cos() - n;
        lat = r[2].atan2(p * (1.0 - WGS84_E2 * n / (n + height)));
    }

    (lat.to_degrees(), lon.to_degrees(), height)
}

pub fn observer_ecef(observer: &Observer) -> Vec3 {
    let lat = observer.latitude_deg.to_radians();
    let lon = observer.longitude_deg.to_radians();
    let h = observer.elevation_m / 1000.0;

    let n = EARTH_RADIUS_KM / (1.0 - WGS84_E2 * lat.sin().powi(2)).sqrt();
    [
        (n + h) * lat.cos() * lon.cos(),
        (n + h) * lat.cos() * lon.sin(),
        (n * (1.0 - WGS84_E2) + h) * lat.sin(),
    ]
}

/// Elevation (deg), azimuth (deg clockwise from north, 0..360) and range (km)
/// of an Earth-fixed target seen from `observer`.
pub fn look_angles(observer: &Observer, target_ecef: Vec3) -> (f64, f64, f64) {
    let site = observer_ecef(observer);
    let d = sub(target_ecef, site);

    let (sin_lat, cos_lat) = observer.latitude_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = observer.longitude_deg.to_radians().sin_cos();

    let east = -sin_lon * d[0] + cos_lon * d[1];
    let north = -sin_lat * cos_lon * d[0] - sin_lat * sin_lon * d[1] + cos_lat * d[2];
    let up = cos_lat * cos_lon * d[0] + cos_lat * sin_lon * d[1] + sin_lat * d[2];

    let elevation = up.atan2(east.hypot(north)).to_degrees();
    let azimuth = east.atan2(north).to_degrees().rem_euclid(360.0);
    (elevation, azimuth, norm(d))
}

/// Geocentric inertial position of the Sun in kilometres.
pub fn sun_position(t: DateTime<Utc>) -> Vec3 {
    let n = julian_date(t) - J2000_JD;
    let mean_lon = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
    let g = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();

    let ecliptic_lon = (mean_lon + 1.915 * g.sin() + 0.020 * (2.0 * g).sin()).to_radians();
    let obliquity = (23.439 - 4.0e-7 * n).to_radians();
    let distance = (1.000_14 - 0.016_71 * g.cos() - 0.000_14 * (2.0 * g).cos()) * AU_KM;

    [
        distance * ecliptic_lon.cos(),
        distance * obliquity.cos() * ecliptic_lon.sin(),
        distance * obliquity.sin() * ecliptic_lon.sin(),
    ]
}

/// Cylindrical Earth shadow test.
pub fn in_earth_shadow(r: Vec3, sun: Vec3) -> bool {
    let sun_dir = scale(sun, 1.0 / norm(sun));
    let along = dot(r, sun_dir);
    if along >= 0.0 {
        return false;
    }
    norm(sub(r, scale(sun_dir, along))) < EARTH_RADIUS_KM
}

pub fn norm(v: Vec3) -> f64 {
    dot(v, v).sqrt()
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn scale(v: Vec3, k: f64) -> Vec3 {
    [v[0] * k, v[1] * k, v[2] * k]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_gmst_at_j2000() {
        let t = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((julian_date(t) - J2000_JD).abs() < 1e-9);
        assert!((gmst(t).to_degrees() - 280.460_618).abs() < 1e-3);
    }

    #[test]
    fn test_geodetic_inverts_observer_position() {
        let observer = Observer::new(45.0, 10.0, 1200.0);
        let (lat, lon, height) = ecef_to_geodetic(observer_ecef(&observer));
        assert!((lat - 45.0).abs() < 1e-6);
        assert!((lon - 10.0).abs() < 1e-6);
        assert!((height - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_look_angles_overhead_and_north() {
        let observer = Observer::new(0.0, 0.0, 0.0);

        let (el, _, range) = look_angles(&observer, [EARTH_RADIUS_KM + 400.0, 0.0, 0.0]);
        assert!((el - 90.0).abs() < 1e-6);
        assert!((range - 400.0).abs() < 1e-6);

        let (el, az, _) = look_angles(&observer, [EARTH_RADIUS_KM + 100.0, 0.0, 500.0]);
        assert!(el > 0.0 && el < 90.0);
        assert!(az < 1e-6 || az > 360.0 - 1e-6);
    }

    #[test]
    fn test_sun_near_vernal_equinox() {
        let t = Utc.with_ymd_and_hms(2024, 3, 20, 3, 6, 0).unwrap();
        let sun = sun_position(t);
        let declination = (sun[2] / norm(sun)).asin().to_degrees();
        assert!(declination.abs() < 0.1);
        assert!((norm(sun) / AU_KM - 0.996).abs() < 0.01);
    }

    #[test]
    fn test_cylindrical_shadow() {
        let sun = [AU_KM, 0.0, 0.0];
        assert!(in_earth_shadow([-7000.0, 0.0, 0.0], sun));
        assert!(!in_earth_shadow([7000.0, 0.0, 0.0], sun));
        assert!(!in_earth_shadow([0.0, 7000.0, 0.0], sun));
        assert!(!in_earth_shadow([-7000.0, 6500.0, 0.0], sun));
    }
}
