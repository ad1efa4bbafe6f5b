//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks of a downloaded series
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - samples: `o`
//! - consecutive samples joined by `-`; a NaN sample breaks the line

use chrono::NaiveDateTime;

use crate::domain::DemandPoint;

/// Render demand over time on a `width` x `height` character grid.
pub fn render_demand_plot(points: &[DemandPoint], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let Some((t0, t1)) = time_range(points) else {
        return "Plot: no data\n".to_string();
    };
    let Some((y_min, y_max)) = y_range(points) else {
        return "Plot: no finite demand values\n".to_string();
    };
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let x_span = (t1 - t0).num_seconds().max(1) as f64;
    let to_x = |ts: NaiveDateTime| map_x((ts - t0).num_seconds() as f64, x_span, width);

    let mut grid = vec![vec![' '; width]; height];

    // Line first so samples can overlay.
    let mut prev: Option<(usize, usize)> = None;
    for p in points {
        if !p.demand_mw.is_finite() {
            prev = None;
            continue;
        }
        let cell = (to_x(p.timestamp), map_y(p.demand_mw, y_min, y_max, height));
        if let Some((x0, y0)) = prev {
            draw_line(&mut grid, x0, y0, cell.0, cell.1, '-');
        }
        prev = Some(cell);
    }

    for p in points.iter().filter(|p| p.demand_mw.is_finite()) {
        let x = to_x(p.timestamp);
        let y = map_y(p.demand_mw, y_min, y_max, height);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {} → {} | demand=[{y_min:.2}, {y_max:.2}] MW\n",
        t0.format("%Y-%m-%d %H:%M"),
        t1.format("%Y-%m-%d %H:%M"),
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn time_range(points: &[DemandPoint]) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let min = points.iter().map(|p| p.timestamp).min()?;
    let max = points.iter().map(|p| p.timestamp).max()?;
    Some((min, max))
}

fn y_range(points: &[DemandPoint]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points.iter().filter(|p| p.demand_mw.is_finite()) {
        min_y = min_y.min(p.demand_mw);
        max_y = max_y.max(p.demand_mw);
    }

    if !(min_y.is_finite() && max_y.is_finite()) {
        return None;
    }
    // A flat series still gets a visible band.
    if max_y > min_y {
        Some((min_y, max_y))
    } else {
        Some((min_y - 1.0, max_y + 1.0))
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(offset: f64, span: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = (offset / span).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
