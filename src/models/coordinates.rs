use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_PER_DEGREE_LAT: f64 = 111.32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, String> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(format!(
                "Invalid latitude: {} (must be between -90 and 90)",
                lat
            ));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(format!(
                "Invalid longitude: {} (must be between -180 and 180)",
                lng
            ));
        }
        Ok(Coordinates { lat, lng })
    }

    /// Great-circle (Haversine) distance in km.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }

    /// Extra distance (km) travelled when going a -> self -> b instead of a -> b.
    pub fn detour_km(&self, a: &Coordinates, b: &Coordinates) -> f64 {
        let via = a.distance_to(self) + self.distance_to(b);
        (via - a.distance_to(b)).max(0.0)
    }

    /// Point reached after travelling `fraction` of the way towards `other`
    /// (linear in lat/lng, fine for the short segments of a route geometry).
    pub fn interpolate(&self, other: &Coordinates, fraction: f64) -> Coordinates {
        let t = fraction.clamp(0.0, 1.0);
        Coordinates {
            lat: self.lat + (other.lat - self.lat) * t,
            lng: self.lng + (other.lng - self.lng) * t,
        }
    }

    /// Closest point of segment `a`-`b` to `self`, as (distance km, fraction along the segment).
    /// Projects in lat/lng space, which holds for the short segments of a route geometry.
    fn project_onto_segment(&self, a: &Coordinates, b: &Coordinates) -> (f64, f64) {
        let d_lng = b.lng - a.lng;
        let d_lat = b.lat - a.lat;
        let len_sq = d_lng * d_lng + d_lat * d_lat;
        if len_sq < 1e-18 {
            return (self.distance_to(a), 0.0);
        }

        let t = (((self.lng - a.lng) * d_lng + (self.lat - a.lat) * d_lat) / len_sq).clamp(0.0, 1.0);
        (self.distance_to(&a.interpolate(b, t)), t)
    }

    /// Nearest approach to a path: (distance km, segment index, km along the path
    /// to the nearest point). `None` when the path has fewer than two points.
    pub fn distance_to_linestring(&self, path: &[Coordinates]) -> Option<(f64, usize, f64)> {
        if path.len() < 2 {
            return None;
        }

        let mut best: Option<(f64, usize, f64)> = None;
        let mut travelled = 0.0;
        for (idx, segment) in path.windows(2).enumerate() {
            let length = segment[0].distance_to(&segment[1]);
            let (distance, t) = self.project_onto_segment(&segment[0], &segment[1]);
            if best.map_or(true, |(d, _, _)| distance < d) {
                best = Some((distance, idx, travelled + t * length));
            }
            travelled += length;
        }
        best
    }
}

/// Axis-aligned lat/lng box used as a cheap SQL prefilter.
///
/// A box crossing the antimeridian has `min_lng > max_lng` and covers
/// `[min_lng, 180] ∪ [-180, max_lng]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Smallest box containing every point, grown by `buffer_km` on each side.
    /// Returns `None` for an empty slice.
    pub fn around(points: &[Coordinates], buffer_km: f64) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = BoundingBox {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lng: first.lng,
            max_lng: first.lng,
        };

        for p in &points[1..] {
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.max_lat = bbox.max_lat.max(p.lat);
            bbox.min_lng = bbox.min_lng.min(p.lng);
            bbox.max_lng = bbox.max_lng.max(p.lng);
        }

        let lat_buffer = buffer_km / KM_PER_DEGREE_LAT;
        // Longitude degrees shrink towards the poles; use the widest latitude of the box
        let widest_lat = bbox.min_lat.abs().max(bbox.max_lat.abs()).min(89.0);
        let lng_buffer = buffer_km / (KM_PER_DEGREE_LAT * widest_lat.to_radians().cos());

        bbox.min_lat = (bbox.min_lat - lat_buffer).max(-90.0);
        bbox.max_lat = (bbox.max_lat + lat_buffer).min(90.0);
        let min_lng = bbox.min_lng - lng_buffer;
        let max_lng = bbox.max_lng + lng_buffer;
        if max_lng - min_lng >= 360.0 {
            bbox.min_lng = -180.0;
            bbox.max_lng = 180.0;
        } else {
            bbox.min_lng = wrap_lng(min_lng);
            bbox.max_lng = wrap_lng(max_lng);
        }

        Some(bbox)
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lng > self.max_lng
    }

    pub fn contains(&self, point: &Coordinates) -> bool {
        let lng_inside = if self.crosses_antimeridian() {
            point.lng >= self.min_lng || point.lng <= self.max_lng
        } else {
            (self.min_lng..=self.max_lng).contains(&point.lng)
        };
        lng_inside && (self.min_lat..=self.max_lat).contains(&point.lat)
    }
}

fn wrap_lng(lng: f64) -> f64 {
    if lng < -180.0 {
        lng + 360.0
    } else if lng > 180.0 {
        lng - 360.0
    } else {
        lng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_validation() {
        assert!(Coordinates::new(48.8566, 2.3522).is_ok());
        assert!(Coordinates::new(91.0, 0.0).is_err());
        assert!(Coordinates::new(0.0, 181.0).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_distance_calculation() {
        let paris = Coordinates::new(48.8566, 2.3522).unwrap();
        let london = Coordinates::new(51.5074, -0.1278).unwrap();

        let distance = paris.distance_to(&london);
        // Paris to London is approximately 344 km
        assert!((distance - 344.0).abs() < 10.0);
    }

    #[test]
    fn test_detour_on_straight_line_is_zero() {
        let a = Coordinates::new(0.0, 0.0).unwrap();
        let b = Coordinates::new(0.0, 2.0).unwrap();
        let mid = Coordinates::new(0.0, 1.0).unwrap();

        assert!(mid.detour_km(&a, &b) < 1e-6);
    }

    #[test]
    fn test_detour_off_route_is_positive() {
        let paris = Coordinates::new(48.8566, 2.3522).unwrap();
        let lyon = Coordinates::new(45.7640, 4.8357).unwrap();
        let dijon = Coordinates::new(47.3220, 5.0415).unwrap();
        let bordeaux = Coordinates::new(44.8378, -0.5792).unwrap();

        let dijon_detour = dijon.detour_km(&paris, &lyon);
        let bordeaux_detour = bordeaux.detour_km(&paris, &lyon);

        assert!(dijon_detour > 0.0);
        assert!(dijon_detour < bordeaux_detour);
    }

    #[test]
    fn test_distance_to_linestring() {
        let path = vec![
            Coordinates::new(48.8566, 2.3522).unwrap(),
            Coordinates::new(48.8600, 2.3600).unwrap(),
            Coordinates::new(48.8650, 2.3700).unwrap(),
        ];

        let point = Coordinates::new(48.8585, 2.3565).unwrap();
        let (dist, segment_idx, dist_along) = point.distance_to_linestring(&path).unwrap();

        assert!(dist < 0.5, "Point should be close to path");
        assert!(segment_idx < 2);
        assert!(dist_along > 0.0);

        let single_point = vec![Coordinates::new(48.8566, 2.3522).unwrap()];
        assert!(point.distance_to_linestring(&single_point).is_none());
    }

    #[test]
    fn test_bounding_box_contains_points_and_buffer() {
        let points = vec![
            Coordinates::new(48.0, 2.0).unwrap(),
            Coordinates::new(45.0, 5.0).unwrap(),
        ];
        let bbox = BoundingBox::around(&points, 10.0).unwrap();

        assert!(bbox.contains(&points[0]));
        assert!(bbox.contains(&points[1]));
        assert!(bbox.min_lat < 45.0 && bbox.max_lat > 48.0);
        assert!(!bbox.contains(&Coordinates::new(50.0, 2.0).unwrap()));
        assert!(BoundingBox::around(&[], 10.0).is_none());
    }

    #[test]
    fn test_bounding_box_wraps_across_antimeridian() {
        let suva_east = Coordinates::new(-17.0, 179.9).unwrap();
        let bbox = BoundingBox::around(&[suva_east], 50.0).unwrap();

        assert!(bbox.crosses_antimeridian());
        assert!(bbox.max_lng > -180.0 && bbox.max_lng < -179.0);
        assert!(bbox.contains(&suva_east));
        assert!(bbox.contains(&Coordinates::new(-17.0, -179.9).unwrap()));
        assert!(!bbox.contains(&Coordinates::new(-17.0, 0.0).unwrap()));
        assert!(!bbox.contains(&Coordinates::new(-17.0, 178.0).unwrap()));
    }

    #[test]
    fn test_interpolate_clamps() {
        let a = Coordinates::new(0.0, 0.0).unwrap();
        let b = Coordinates::new(10.0, 10.0).unwrap();

        assert_eq!(a.interpolate(&b, 0.5), Coordinates { lat: 5.0, lng: 5.0 });
        assert_eq!(a.interpolate(&b, 2.0), b);
    }
}
