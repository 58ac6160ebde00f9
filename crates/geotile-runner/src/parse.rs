//! Parsing of the comma-separated values accepted on the command line.

use geotile_raster::{PixelBounds, PixelSize};
use std::path::Path;

use crate::error::{Result, RunnerError};

fn split_numbers<T: std::str::FromStr>(
    value: &str,
    count: usize,
    what: &'static str,
    expected: &'static str,
) -> Result<Vec<T>> {
    let invalid = || RunnerError::InvalidArgument {
        what,
        value: value.to_string(),
        expected,
    };
    let numbers = value
        .split(',')
        .map(|part| part.trim().parse::<T>().map_err(|_| invalid()))
        .collect::<Result<Vec<T>>>()?;
    if numbers.len() != count {
        return Err(invalid());
    }
    Ok(numbers)
}

/// `WIDTH,HEIGHT` in metric units.
pub fn parse_dimensions(value: &str) -> Result<(f64, f64)> {
    let numbers = split_numbers::<f64>(value, 2, "dimensions", "WIDTH,HEIGHT")?;
    if numbers.iter().any(|n| !n.is_finite() || *n < 0.0) {
        return Err(RunnerError::InvalidArgument {
            what: "dimensions",
            value: value.to_string(),
            expected: "non-negative WIDTH,HEIGHT",
        });
    }
    Ok((numbers[0], numbers[1]))
}

/// `WIDTH,HEIGHT` in pixels.
pub fn parse_pixel_dimensions(value: &str) -> Result<PixelSize> {
    let numbers = split_numbers::<u32>(value, 2, "pixel dimensions", "WIDTH,HEIGHT")?;
    Ok(PixelSize::new(numbers[0], numbers[1]))
}

/// `MIN_X,MIN_Y,MAX_X,MAX_Y` in pixels.
pub fn parse_bounds(value: &str) -> Result<PixelBounds> {
    let n = split_numbers::<i64>(value, 4, "pixel bounds", "MIN_X,MIN_Y,MAX_X,MAX_Y")?;
    if n[0] > n[2] || n[1] > n[3] {
        return Err(RunnerError::InvalidArgument {
            what: "pixel bounds",
            value: value.to_string(),
            expected: "MIN_X <= MAX_X and MIN_Y <= MAX_Y",
        });
    }
    Ok(PixelBounds::new(n[0], n[1], n[2], n[3]))
}

/// `X,Y` in projected coordinates.
pub fn parse_point(value: &str) -> Result<(f64, f64)> {
    let numbers = split_numbers::<f64>(value, 2, "point", "X,Y")?;
    Ok((numbers[0], numbers[1]))
}

/// Read one `X,Y` point per line. Blank lines and lines starting with `#` are skipped.
pub fn read_points(path: &Path) -> Result<Vec<(f64, f64)>> {
    std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_point)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dimensions() {
        assert_eq!(parse_dimensions("40,20.5").unwrap(), (40.0, 20.5));
        assert_eq!(parse_dimensions(" 10 , 10 ").unwrap(), (10.0, 10.0));
        assert!(parse_dimensions("40").is_err());
        assert!(parse_dimensions("40,20,1").is_err());
        assert!(parse_dimensions("-1,5").is_err());
        assert!(parse_dimensions("a,b").is_err());
    }

    #[test]
    fn test_parse_pixel_dimensions() {
        assert_eq!(parse_pixel_dimensions("32,16").unwrap(), PixelSize::new(32, 16));
        assert!(parse_pixel_dimensions("-3,16").is_err());
    }

    #[test]
    fn test_parse_bounds() {
        assert_eq!(parse_bounds("0,5,10,20").unwrap(), PixelBounds::new(0, 5, 10, 20));
        assert!(parse_bounds("10,5,0,20").is_err());
        assert!(parse_bounds("0,5,10").is_err());

        let err = parse_bounds("x").unwrap_err();
        assert!(err.to_string().contains("MIN_X,MIN_Y,MAX_X,MAX_Y"));
    }

    #[test]
    fn test_read_points() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("points.txt");
        std::fs::write(&path, "# x,y\n500010,4099990\n\n500050.5, 4099950\n").unwrap();
        assert_eq!(
            read_points(&path).unwrap(),
            vec![(500_010.0, 4_099_990.0), (500_050.5, 4_099_950.0)]
        );

        std::fs::write(&path, "1,2\nnot a point\n").unwrap();
        assert!(matches!(
            read_points(&path),
            Err(RunnerError::InvalidArgument { what: "point", .. })
        ));
    }
}
