use crate::aggregate::GroupCount;
use crate::error::{DashboardError, DashboardResult};
use plotters::prelude::*;

/// Configuration options for chart generation
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the chart
    pub title: String,

    /// Label under the category axis
    pub x_label: String,

    /// Label for the count axis
    pub y_label: String,

    /// Width of the chart in pixels
    pub width: u32,

    /// Height of the chart in pixels
    pub height: u32,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            title: "Orders".to_string(),
            x_label: "Category".to_string(),
            y_label: "Orders".to_string(),
            width: 800,
            height: 450,
        }
    }
}

/// Draws one bar per group as an inline SVG document
///
/// Bars keep the order of `groups` (largest first, as the aggregator hands
/// them over) and each gets its own palette colour.
///
/// # Arguments
/// * `groups` - Counts per city or service
/// * `options` - Title, axis labels and size
///
/// # Returns
/// * `DashboardResult<String>` - The SVG markup, or an empty string when there is nothing to plot
pub fn create_bar_chart(groups: &[GroupCount], options: &GraphOptions) -> DashboardResult<String> {
    if groups.is_empty() {
        return Ok(String::new());
    }

    let mut svg = String::new();
    draw_bars(&mut svg, groups, options)
        .map_err(|e| DashboardError::Render(format!("Chart '{}' failed: {}", options.title, e)))?;
    Ok(svg)
}

fn draw_bars(
    svg: &mut String,
    groups: &[GroupCount],
    options: &GraphOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = SVGBackend::with_string(svg, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let bars = groups.len() as u32;
    let max_count = groups.iter().map(|g| g.count).max().unwrap_or(0) as u32;
    // Leave headroom above the tallest bar.
    let y_top = max_count + (max_count / 10).max(1);

    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 24).into_font())
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(50)
        .build_cartesian_2d((0u32..bars).into_segmented(), 0u32..y_top)?;

    let label_of = |value: &SegmentValue<u32>| match value {
        SegmentValue::CenterOf(idx) => groups
            .get(*idx as usize)
            .map(|g| g.label.clone())
            .unwrap_or_default(),
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(groups.len())
        .x_label_formatter(&label_of)
        .x_desc(options.x_label.as_str())
        .y_desc(options.y_label.as_str())
        .draw()?;

    chart.draw_series(groups.iter().enumerate().map(|(idx, group)| {
        let idx = idx as u32;
        let style = Palette99::pick(idx as usize).filled();
        let mut bar = Rectangle::new(
            [
                (SegmentValue::Exact(idx), 0),
                (SegmentValue::Exact(idx + 1), group.count as u32),
            ],
            style,
        );
        bar.set_margin(0, 0, 8, 8);
        bar
    }))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups() -> Vec<GroupCount> {
        vec![
            GroupCount { label: "Pune".into(), count: 3 },
            GroupCount { label: "Delhi".into(), count: 1 },
        ]
    }

    #[test]
    fn bar_chart_is_svg() {
        let options = GraphOptions {
            title: "Orders by City".into(),
            ..GraphOptions::default()
        };
        let svg = create_bar_chart(&groups(), &options).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Orders by City"));
        assert!(svg.contains("Pune"));
        assert!(svg.contains("<rect"));
    }

    #[test]
    fn empty_series_draws_nothing() {
        assert_eq!(create_bar_chart(&[], &GraphOptions::default()).unwrap(), "");
    }
}
