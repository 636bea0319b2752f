use crate::error::FieldError;
use crate::traits::SlopeFunction;
use serde::{Deserialize, Serialize};

/// Most sample points one field may hold; grid counts arrive from callers.
pub const MAX_FIELD_POINTS: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            x_min: -5.0,
            x_max: 5.0,
            y_min: -5.0,
            y_max: 5.0,
        }
    }
}

impl Bounds {
    pub fn x_range(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn y_range(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn validate(&self) -> Result<(), FieldError> {
        let finite = [self.x_min, self.x_max, self.y_min, self.y_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.x_max <= self.x_min || self.y_max <= self.y_min {
            return Err(FieldError::InvalidBounds);
        }
        // A finite but overflowing span is no more usable than an infinite one.
        if !self.x_range().is_finite() || !self.y_range().is_finite() {
            return Err(FieldError::InvalidBounds);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectionFieldSettings {
    pub bounds: Bounds,
    pub grid_count_x: usize,
    pub grid_count_y: usize,
    pub arrow_scale: f64,
    /// Points whose |slope| exceeds this are left out of the field.
    pub slope_ceiling: f64,
}

impl Default for DirectionFieldSettings {
    fn default() -> Self {
        Self {
            bounds: Bounds::default(),
            grid_count_x: 20,
            grid_count_y: 20,
            arrow_scale: 0.8,
            slope_ceiling: 1000.0,
        }
    }
}

impl DirectionFieldSettings {
    pub fn validate(&self) -> Result<(), FieldError> {
        self.bounds.validate()?;
        if !(self.arrow_scale.is_finite() && self.arrow_scale > 0.0) {
            return Err(FieldError::InvalidArrowScale(self.arrow_scale));
        }
        if self.slope_ceiling.is_nan() || self.slope_ceiling <= 0.0 {
            return Err(FieldError::InvalidSlopeCeiling(self.slope_ceiling));
        }
        self.lattice()?;
        Ok(())
    }

    /// Columns and rows of cell centres, `(grid_count_x + 1, grid_count_y + 1)`.
    pub fn lattice(&self) -> Result<(usize, usize), FieldError> {
        let too_large = || FieldError::GridTooLarge {
            x: self.grid_count_x,
            y: self.grid_count_y,
            limit: MAX_FIELD_POINTS,
        };
        let columns = self.grid_count_x.checked_add(1).ok_or_else(too_large)?;
        let rows = self.grid_count_y.checked_add(1).ok_or_else(too_large)?;
        match columns.checked_mul(rows) {
            Some(points) if points <= MAX_FIELD_POINTS => Ok((columns, rows)),
            _ => Err(too_large()),
        }
    }
}

/// One arrow of the field, centred on the sampled point `(x, y)`, in the
/// same coordinates as a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldSegment {
    pub x: f64,
    pub y: f64,
    pub slope: f64,
    pub start: [f64; 2],
    pub end: [f64; 2],
}

/// Samples `f` on a `(grid_count_x + 1) x (grid_count_y + 1)` lattice of cell
/// centres, so no point lies on the boundary.
///
/// The arrow angle is taken in coordinates normalized by the axis ranges, so
/// arrows look tangent to solutions when the plot is not square. Points with
/// a non-finite or too-steep slope are skipped.
pub fn sample(
    f: &(impl SlopeFunction + ?Sized),
    settings: &DirectionFieldSettings,
) -> Result<Vec<FieldSegment>, FieldError> {
    settings.validate()?;
    let bounds = &settings.bounds;
    let (x_range, y_range) = (bounds.x_range(), bounds.y_range());
    let (columns, rows) = settings.lattice()?;
    let dx = x_range / columns as f64;
    let dy = y_range / rows as f64;

    let spacing = (1.0 / columns as f64).min(1.0 / rows as f64);
    let half_length = 0.5 * settings.arrow_scale * spacing;

    let mut segments = Vec::with_capacity(columns * rows);
    let mut skipped = 0usize;
    for i in 0..columns {
        let x = bounds.x_min + (i as f64 + 0.5) * dx;
        for j in 0..rows {
            let y = bounds.y_min + (j as f64 + 0.5) * dy;
            let slope = f.slope(x, y);
            if !slope.is_finite() || slope.abs() > settings.slope_ceiling {
                skipped += 1;
                continue;
            }
            let angle = (slope * x_range / y_range).atan();
            let half_x = angle.cos() * half_length * x_range;
            let half_y = angle.sin() * half_length * y_range;
            segments.push(FieldSegment {
                x,
                y,
                slope,
                start: [x - half_x, y - half_y],
                end: [x + half_x, y + half_y],
            });
        }
    }

    if skipped > 0 {
        log::debug!(
            "direction field: skipped {skipped} of {} points with undefined or steep slope",
            columns * rows
        );
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::{sample, Bounds, DirectionFieldSettings, MAX_FIELD_POINTS};
    use crate::equation_engine::compile;
    use crate::error::FieldError;
    use crate::normalizer::normalize;

    fn settings(bounds: Bounds, nx: usize, ny: usize) -> DirectionFieldSettings {
        DirectionFieldSettings {
            bounds,
            grid_count_x: nx,
            grid_count_y: ny,
            ..DirectionFieldSettings::default()
        }
    }

    #[test]
    fn default_grid_has_interior_points_only() {
        let flat = |_x: f64, _y: f64| 0.0;
        let defaults = DirectionFieldSettings::default();
        let segments = sample(&flat, &defaults).expect("sampling should succeed");
        assert_eq!(segments.len(), 21 * 21);
        let b = defaults.bounds;
        for s in &segments {
            assert!(s.x > b.x_min && s.x < b.x_max);
            assert!(s.y > b.y_min && s.y < b.y_max);
            assert_eq!(s.start[1], s.y);
            assert_eq!(s.end[1], s.y);
        }
    }

    #[test]
    fn infinite_and_undefined_slopes_are_omitted() {
        let vertical_left = |x: f64, _y: f64| if x < 0.0 { f64::INFINITY } else { 1.0 };
        let segments = sample(&vertical_left, &settings(Bounds::default(), 3, 3))
            .expect("sampling should succeed");
        assert_eq!(segments.len(), 8);
        assert!(segments.iter().all(|s| s.x > 0.0 && s.slope.is_finite()));

        let log_of_x = compile(&normalize("\\ln(x)").expect("normalize")).expect("compile");
        let segments = sample(&log_of_x, &settings(Bounds::default(), 3, 3))
            .expect("sampling should succeed");
        assert!(segments.iter().all(|s| s.x > 0.0));
    }

    #[test]
    fn slopes_above_ceiling_are_omitted() {
        let steep = |_x: f64, _y: f64| 2000.0;
        let segments = sample(&steep, &DirectionFieldSettings::default()).expect("sampling");
        assert!(segments.is_empty());

        let relaxed = DirectionFieldSettings {
            slope_ceiling: 5000.0,
            ..DirectionFieldSettings::default()
        };
        assert_eq!(sample(&steep, &relaxed).expect("sampling").len(), 441);
    }

    #[test]
    fn segments_follow_the_local_tangent_under_anisotropic_axes() {
        let bounds = Bounds {
            x_min: 0.0,
            x_max: 10.0,
            y_min: -1.0,
            y_max: 1.0,
        };
        let evaluator = compile(&normalize("x - 3y").expect("normalize")).expect("compile");
        let segments = sample(&evaluator, &settings(bounds, 9, 4)).expect("sampling");
        assert_eq!(segments.len(), 50);
        for s in &segments {
            let data_slope = (s.end[1] - s.start[1]) / (s.end[0] - s.start[0]);
            assert!(
                (data_slope - s.slope).abs() <= 1e-9 * s.slope.abs().max(1.0),
                "segment slope {} vs field slope {}",
                data_slope,
                s.slope
            );
            assert!(((s.start[0] + s.end[0]) / 2.0 - s.x).abs() < 1e-12);
            assert!(((s.start[1] + s.end[1]) / 2.0 - s.y).abs() < 1e-12);
        }
    }

    #[test]
    fn arrow_length_scales_with_spacing_and_arrow_scale() {
        let diagonal = |_x: f64, _y: f64| 1.0;
        let defaults = DirectionFieldSettings::default();
        let segments = sample(&diagonal, &defaults).expect("sampling");
        let s = segments[0];
        // Normalized by the 10x10 window, the arrow spans arrow_scale / 21.
        let nx = (s.end[0] - s.start[0]) / 10.0;
        let ny = (s.end[1] - s.start[1]) / 10.0;
        let length = (nx * nx + ny * ny).sqrt();
        assert!((length - 0.8 / 21.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_invalid_settings() {
        let flat = |_x: f64, _y: f64| 0.0;
        let inverted = Bounds {
            x_min: 1.0,
            x_max: -1.0,
            ..Bounds::default()
        };
        assert_eq!(
            sample(&flat, &settings(inverted, 4, 4)),
            Err(FieldError::InvalidBounds)
        );
        let nan_bounds = Bounds {
            y_max: f64::NAN,
            ..Bounds::default()
        };
        assert_eq!(
            sample(&flat, &settings(nan_bounds, 4, 4)),
            Err(FieldError::InvalidBounds)
        );
        let zero_scale = DirectionFieldSettings {
            arrow_scale: 0.0,
            ..DirectionFieldSettings::default()
        };
        assert_eq!(
            sample(&flat, &zero_scale),
            Err(FieldError::InvalidArrowScale(0.0))
        );
    }

    #[test]
    fn oversized_grids_are_rejected_before_sampling() {
        let flat = |_x: f64, _y: f64| 0.0;
        let err = sample(&flat, &settings(Bounds::default(), usize::MAX, 20))
            .expect_err("overflowing grid count");
        assert_eq!(
            err,
            FieldError::GridTooLarge {
                x: usize::MAX,
                y: 20,
                limit: MAX_FIELD_POINTS,
            }
        );
        let huge = settings(Bounds::default(), 1 << 20, 1 << 20);
        assert!(matches!(huge.validate(), Err(FieldError::GridTooLarge { .. })));
        let wide = settings(Bounds::default(), 5_000, 199);
        assert!(matches!(wide.validate(), Err(FieldError::GridTooLarge { .. })));
    }

    #[test]
    fn grid_at_the_point_limit_is_accepted() {
        let edge = settings(Bounds::default(), 999, 999);
        assert_eq!(edge.lattice(), Ok((1_000, 1_000)));
        assert!(edge.validate().is_ok());
    }
}
