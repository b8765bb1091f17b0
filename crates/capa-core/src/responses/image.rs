//! Click-on-image responses graded against rectangles or polygon regions.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;

use crate::correctmap::{CorrectMap, CorrectMapEntry, Correctness};
use crate::error::CapaError;
use crate::inputs::InputKind;
use crate::model::StudentAnswers;
use crate::xml::{escape_attr, Document, NodeId};

use super::{ExpectedAnswer, GradeContext, Grader, ResponseBase};

const RECTANGLE_PATTERN: &str = r"^[\(\[](-?\d+),(-?\d+)[\)\]]-[\(\[](-?\d+),(-?\d+)[\)\]]$";
const CLICK_PATTERN: &str = r"^\[(\d+),(\d+)\]";

type Point = (f64, f64);

#[derive(Debug, Clone, PartialEq)]
struct Target {
    id: String,
    rectangle: Option<String>,
    regions: Option<String>,
    /// `(x1, y1, x2, y2)` corners.
    rectangles: Vec<(i64, i64, i64, i64)>,
    polygons: Vec<Vec<Point>>,
}

impl Target {
    fn contains(&self, x: i64, y: i64) -> bool {
        let in_rectangle = self.rectangles.iter().any(|&(x1, y1, x2, y2)| {
            x1.min(x2) <= x && x <= x1.max(x2) && y1.min(y2) <= y && y <= y1.max(y2)
        });
        in_rectangle
            || self
                .polygons
                .iter()
                .any(|polygon| hull_strictly_contains(polygon, (x as f64, y as f64)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageResponse {
    targets: Vec<Target>,
}

impl ImageResponse {
    pub(crate) fn build(doc: &Document, inputs: &[(NodeId, InputKind)]) -> Result<Self, CapaError> {
        let rect_re = Regex::new(RECTANGLE_PATTERN).map_err(|e| CapaError::Parse(e.to_string()))?;
        let mut targets = Vec::with_capacity(inputs.len());
        for (input, _) in inputs {
            let rectangle = doc.attr(*input, "rectangle").map(str::to_string);
            let regions = doc.attr(*input, "regions").map(str::to_string);

            let mut rectangles = Vec::new();
            if let Some(spec) = &rectangle {
                for part in spec.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                    let compact: String = part.chars().filter(|c| !c.is_whitespace()).collect();
                    let corners = rect_re
                        .captures(&compact)
                        .and_then(|c| {
                            let n = |i: usize| c.get(i)?.as_str().parse::<i64>().ok();
                            Some((n(1)?, n(2)?, n(3)?, n(4)?))
                        })
                        .ok_or_else(|| {
                            CapaError::GraderConfiguration(format!(
                                "Error in problem specification! Cannot parse rectangle in {part}"
                            ))
                        })?;
                    rectangles.push(corners);
                }
            }

            let polygons = match &regions {
                Some(spec) => parse_regions(spec)?,
                None => Vec::new(),
            };

            targets.push(Target {
                id: doc.attr(*input, "id").unwrap_or_default().to_string(),
                rectangle,
                regions,
                rectangles,
                polygons,
            });
        }
        Ok(Self { targets })
    }
}

/// Parse one polygon `[[x,y],...]` or a list of them.
fn parse_regions(spec: &str) -> Result<Vec<Vec<Point>>, CapaError> {
    let invalid = || CapaError::GraderConfiguration(format!("Error in problem specification! Cannot parse regions in {spec}"));
    let value: Value = serde_json::from_str(spec).map_err(|_| invalid())?;
    let items = value.as_array().ok_or_else(invalid)?;
    let nested = items
        .first()
        .and_then(Value::as_array)
        .and_then(|first| first.first())
        .is_some_and(Value::is_array);
    let polygons: Vec<&Value> = if nested { items.iter().collect() } else { vec![&value] };

    polygons
        .into_iter()
        .map(|polygon| {
            polygon
                .as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(|point| match point.as_array().map(Vec::as_slice) {
                    Some([x, y]) => Some((x.as_f64()?, y.as_f64()?)),
                    _ => None,
                })
                .collect::<Option<Vec<Point>>>()
                .ok_or_else(invalid)
        })
        .collect()
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Counter-clockwise convex hull (monotone chain).
fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }
    let mut hull: Vec<Point> = Vec::with_capacity(pts.len() * 2);
    for pass in 0..2 {
        let start = hull.len();
        let iter: Box<dyn Iterator<Item = &Point>> = if pass == 0 {
            Box::new(pts.iter())
        } else {
            Box::new(pts.iter().rev())
        };
        for &p in iter {
            while hull.len() >= start + 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
                hull.pop();
            }
            hull.push(p);
        }
        hull.pop();
    }
    hull
}

/// Returns `true` if `p` lies strictly inside the convex hull of `polygon`.
fn hull_strictly_contains(polygon: &[Point], p: Point) -> bool {
    let hull = convex_hull(polygon);
    if hull.len() < 3 {
        return false;
    }
    (0..hull.len()).all(|i| cross(hull[i], hull[(i + 1) % hull.len()], p) > 0.0)
}

impl Grader for ImageResponse {
    fn get_score(
        &self,
        _base: &ResponseBase,
        answers: &StudentAnswers,
        _gctx: &GradeContext<'_>,
    ) -> Result<CorrectMap, CapaError> {
        let click_re = Regex::new(CLICK_PATTERN).map_err(|e| CapaError::Response(e.to_string()))?;
        let mut cmap = CorrectMap::new();
        for target in &self.targets {
            cmap.set(&target.id, CorrectMapEntry::graded(Correctness::Incorrect));
            let given = answers.get(&target.id).map(|a| a.as_text()).unwrap_or_default();
            if given.trim().is_empty() {
                continue;
            }
            let compact: String = given.chars().filter(|c| *c != ' ').collect();
            let (x, y) = click_re
                .captures(&compact)
                .and_then(|c| Some((c.get(1)?.as_str().parse::<i64>().ok()?, c.get(2)?.as_str().parse::<i64>().ok()?)))
                .ok_or_else(|| {
                    CapaError::StudentInput(format!(
                        "error grading {} (input={})",
                        target.id,
                        escape_attr(&given)
                    ))
                })?;
            if target.contains(x, y) {
                cmap.set(&target.id, CorrectMapEntry::graded(Correctness::Correct));
            }
        }
        Ok(cmap)
    }

    fn get_answers(&self, _base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer> {
        self.targets
            .iter()
            .map(|t| {
                (
                    t.id.clone(),
                    ExpectedAnswer::Region {
                        rectangle: t.rectangle.clone(),
                        regions: t.regions.clone(),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::context::EvalContext;
    use crate::model::StudentAnswer;

    async fn click(xml: &str, at: &str) -> Result<CorrectMap, CapaError> {
        let ctx = EvalContext::new(1, "s");
        let (_, response) = build(xml, &ctx);
        grade_with(&system(), &ctx, &response, &answers(&[("p_2_1", StudentAnswer::from(at))])).await
    }

    const RECT: &str = r#"<imageresponse><imageinput src="a.png" width="100" height="100" rectangle="(10,10)-(20,20);[50,50]-[60,60]"/></imageresponse>"#;

    #[tokio::test]
    async fn rectangle_edges_are_inclusive() {
        assert_eq!(click(RECT, "[10,20]").await.unwrap().correctness("p_2_1"), Some(Correctness::Correct));
        assert_eq!(click(RECT, "[55, 55]").await.unwrap().correctness("p_2_1"), Some(Correctness::Correct));
        assert_eq!(click(RECT, "[30,30]").await.unwrap().correctness("p_2_1"), Some(Correctness::Incorrect));
        assert_eq!(click(RECT, "").await.unwrap().correctness("p_2_1"), Some(Correctness::Incorrect));
    }

    #[tokio::test]
    async fn malformed_click_is_a_student_error() {
        let err = click(RECT, "here").await.unwrap_err();
        assert!(err.to_string().contains("error grading p_2_1"));
    }

    #[tokio::test]
    async fn region_interior_only() {
        let xml = r#"<imageresponse><imageinput src="a.png" width="100" height="100" regions="[[0,0],[10,0],[10,10],[0,10]]"/></imageresponse>"#;
        assert_eq!(click(xml, "[5,5]").await.unwrap().correctness("p_2_1"), Some(Correctness::Correct));
        assert_eq!(click(xml, "[10,5]").await.unwrap().correctness("p_2_1"), Some(Correctness::Incorrect));
    }

    #[test]
    fn multiple_regions_and_degenerate_polygons() {
        let polygons = parse_regions("[[[0,0],[4,0],[0,4]], [[10,10],[20,20]]]").unwrap();
        assert_eq!(polygons.len(), 2);
        assert!(hull_strictly_contains(&polygons[0], (1.0, 1.0)));
        assert!(!hull_strictly_contains(&polygons[1], (15.0, 15.0)));
    }

    #[test]
    fn bad_rectangle_is_a_configuration_error() {
        let mut doc = Document::parse(
            r#"<imageresponse id="p_2"><imageinput id="p_2_1" src="a.png" width="1" height="1" rectangle="(1,2)"/></imageresponse>"#,
        )
        .unwrap();
        let root = doc.root();
        let err = crate::responses::Response::build(&mut doc, root, &EvalContext::new(1, "s")).unwrap_err();
        assert!(err.to_string().contains("Cannot parse rectangle in (1,2)"));
    }
}
