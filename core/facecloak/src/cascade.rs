//! Boosted Haar cascade detector reading OpenCV's XML cascade format.
//!
//! Supports the `BOOST`/`HAAR` cascades shipped with OpenCV such as
//! `haarcascade_frontalface_default.xml` and `haarcascade_eye.xml`. The image
//! pyramid is built by downscaling the luminance image, each window is
//! variance-normalized, and raw hits are merged with a neighbor vote.

use std::path::Path;

use image::imageops::FilterType;
use image::GrayImage;
use roxmltree::{Document, Node};

use crate::detector::ObjectDetector;
use crate::error::CloakError;
use crate::geometry::BoundingBox;

/// Default pyramid step between detection scales.
pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;

/// Relative tolerance used when merging overlapping raw hits.
const GROUP_EPS: f64 = 0.2;

#[derive(Debug, Clone)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f32,
}

#[derive(Debug, Clone)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f32,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f32>,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f32,
    classifiers: Vec<WeakClassifier>,
}

/// A trained Haar cascade, immutable once loaded.
#[derive(Debug, Clone)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
    scale_factor: f64,
}

impl HaarCascade {
    /// Load a cascade from an OpenCV XML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CloakError> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)
            .map_err(|e| CloakError::CascadeLoad(format!("{}: {e}", path.display())))?;
        Self::from_xml(&xml)
    }

    /// Parse a cascade from the contents of an OpenCV XML file.
    pub fn from_xml(xml: &str) -> Result<Self, CloakError> {
        let doc = Document::parse(xml).map_err(|e| CloakError::CascadeLoad(e.to_string()))?;
        let cascade = doc
            .root_element()
            .children()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or_else(|| {
                load_error("missing <cascade> element (old-style cascades are not supported)")
            })?;

        if let Some(stage_type) = optional_text(cascade, "stageType") {
            if stage_type != "BOOST" {
                return Err(load_error(&format!("unsupported stage type {stage_type}")));
            }
        }
        if let Some(feature_type) = optional_text(cascade, "featureType") {
            if feature_type != "HAAR" {
                return Err(load_error(&format!("unsupported feature type {feature_type}")));
            }
        }

        let window_width: u32 = parse_one(child(cascade, "width")?)?;
        let window_height: u32 = parse_one(child(cascade, "height")?)?;
        if window_width < 3 || window_height < 3 {
            return Err(load_error("window must be at least 3x3"));
        }

        let features = items(child(cascade, "features")?)
            .map(parse_feature)
            .collect::<Result<Vec<_>, _>>()?;
        let stages = items(child(cascade, "stages")?)
            .map(parse_stage)
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(load_error("cascade has no stages"));
        }
        for stage in &stages {
            for weak in &stage.classifiers {
                for node in &weak.nodes {
                    if node.feature >= features.len() {
                        let msg = format!("feature index {} out of range", node.feature);
                        return Err(load_error(&msg));
                    }
                }
            }
        }
        for feature in &features {
            for rect in &feature.rects {
                if rect.x + rect.width > window_width || rect.y + rect.height > window_height {
                    return Err(load_error("feature rectangle exceeds the detection window"));
                }
            }
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
            scale_factor: DEFAULT_SCALE_FACTOR,
        })
    }

    /// Set the pyramid step between scales (default: 1.1). Values at or
    /// below 1.0 are raised to 1.01.
    pub fn with_scale_factor(mut self, factor: f64) -> Self {
        self.scale_factor = factor.max(1.01);
        self
    }

    /// Size of the training window, `(width, height)`.
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    /// Every window that passes all stages, before neighbor grouping.
    fn raw_hits(&self, luma: &GrayImage, min_side: u32) -> Vec<BoundingBox> {
        let (img_w, img_h) = luma.dimensions();
        let mut hits = Vec::new();
        let mut factor = 1.0_f64;

        loop {
            let scaled_w = (img_w as f64 / factor).round() as u32;
            let scaled_h = (img_h as f64 / factor).round() as u32;
            if scaled_w < self.window_width || scaled_h < self.window_height {
                break;
            }

            let win_w = (self.window_width as f64 * factor).round() as u32;
            let win_h = (self.window_height as f64 * factor).round() as u32;
            if win_w >= min_side && win_h >= min_side {
                let integral = if scaled_w == img_w && scaled_h == img_h {
                    Integral::new(luma)
                } else {
                    let scaled =
                        image::imageops::resize(luma, scaled_w, scaled_h, FilterType::Triangle);
                    Integral::new(&scaled)
                };

                let step = if factor > 2.0 { 1 } else { 2 };
                for y in (0..=scaled_h - self.window_height).step_by(step) {
                    for x in (0..=scaled_w - self.window_width).step_by(step) {
                        if self.accepts(&integral, x, y) {
                            hits.push(BoundingBox::new(
                                (x as f64 * factor).round() as u32,
                                (y as f64 * factor).round() as u32,
                                win_w,
                                win_h,
                            ));
                        }
                    }
                }
            }

            factor *= self.scale_factor;
        }

        hits
    }

    /// Run every stage on the window whose top-left corner is `(x, y)`.
    fn accepts(&self, integral: &Integral, x: u32, y: u32) -> bool {
        // Normalize by the standard deviation of the window minus a 1px border.
        let inner_w = self.window_width - 2;
        let inner_h = self.window_height - 2;
        let area = (inner_w * inner_h) as f64;
        let sum = integral.sum(x + 1, y + 1, inner_w, inner_h) as f64;
        let sq_sum = integral.sq_sum(x + 1, y + 1, inner_w, inner_h) as f64;
        let spread = area * sq_sum - sum * sum;
        let norm = if spread > 0.0 { spread.sqrt() } else { 1.0 };

        self.stages.iter().all(|stage| {
            let total: f32 = stage
                .classifiers
                .iter()
                .map(|weak| weak.evaluate(|idx| self.features[idx].value(integral, x, y) / norm))
                .sum();
            total >= stage.threshold
        })
    }
}

impl ObjectDetector for HaarCascade {
    fn detect(&self, luma: &GrayImage, min_side: u32, min_neighbors: u32) -> Vec<BoundingBox> {
        let hits = self.raw_hits(luma, min_side);
        tracing::trace!(raw_hits = hits.len(), "cascade scan finished");
        group_rectangles(&hits, min_neighbors, GROUP_EPS)
    }
}

impl WeakClassifier {
    fn evaluate(&self, mut feature_value: impl FnMut(usize) -> f64) -> f32 {
        let mut idx: i32 = 0;
        loop {
            let Some(node) = self.nodes.get(idx as usize) else {
                return 0.0;
            };
            let value = feature_value(node.feature);
            idx = if value < node.threshold as f64 {
                node.left
            } else {
                node.right
            };
            if idx <= 0 {
                return self.leaves.get((-idx) as usize).copied().unwrap_or(0.0);
            }
        }
    }
}

impl HaarFeature {
    fn value(&self, integral: &Integral, x: u32, y: u32) -> f64 {
        self.rects
            .iter()
            .map(|r| r.weight as f64 * integral.sum(x + r.x, y + r.y, r.width, r.height) as f64)
            .sum()
    }
}

/// Summed-area tables of pixel values and squared pixel values.
struct Integral {
    stride: usize,
    sums: Vec<u64>,
    sq_sums: Vec<u64>,
}

impl Integral {
    fn new(luma: &GrayImage) -> Self {
        let (w, h) = luma.dimensions();
        let stride = w as usize + 1;
        let mut sums = vec![0u64; stride * (h as usize + 1)];
        let mut sq_sums = vec![0u64; stride * (h as usize + 1)];

        for y in 0..h as usize {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w as usize {
                let v = luma.get_pixel(x as u32, y as u32).0[0] as u64;
                row_sum += v;
                row_sq += v * v;
                let at = (y + 1) * stride + x + 1;
                sums[at] = sums[at - stride] + row_sum;
                sq_sums[at] = sq_sums[at - stride] + row_sq;
            }
        }

        Self {
            stride,
            sums,
            sq_sums,
        }
    }

    fn rect(table: &[u64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }

    fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::rect(&self.sums, self.stride, x, y, w, h)
    }

    fn sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::rect(&self.sq_sums, self.stride, x, y, w, h)
    }
}

/// Merge raw hits into detections.
///
/// Hits are clustered when all four edges lie within `eps` of the smaller
/// box's mean side. Clusters with `min_neighbors` or fewer members are
/// dropped, as are clusters that sit inside a stronger cluster. With
/// `min_neighbors == 0` the raw hits are returned unchanged.
pub(crate) fn group_rectangles(
    hits: &[BoundingBox],
    min_neighbors: u32,
    eps: f64,
) -> Vec<BoundingBox> {
    if min_neighbors == 0 || hits.is_empty() {
        return hits.to_vec();
    }

    let labels = partition(hits, |a, b| similar(a, b, eps));
    let classes = labels.iter().copied().max().map_or(0, |m| m + 1);

    let mut totals = vec![[0i64; 4]; classes];
    let mut counts = vec![0u32; classes];
    for (hit, &label) in hits.iter().zip(&labels) {
        let t = &mut totals[label];
        t[0] += hit.x as i64;
        t[1] += hit.y as i64;
        t[2] += hit.width as i64;
        t[3] += hit.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<[i64; 4]> = totals
        .iter()
        .zip(&counts)
        .map(|(t, &n)| {
            let s = 1.0 / n as f64;
            [
                (t[0] as f64 * s).round() as i64,
                (t[1] as f64 * s).round() as i64,
                (t[2] as f64 * s).round() as i64,
                (t[3] as f64 * s).round() as i64,
            ]
        })
        .collect();

    let mut out = Vec::new();
    for i in 0..classes {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }
        let r1 = averaged[i];

        let swallowed = (0..classes).any(|j| {
            let n2 = counts[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let r2 = averaged[j];
            let dx = (r2[2] as f64 * eps).round() as i64;
            let dy = (r2[3] as f64 * eps).round() as i64;
            r1[0] >= r2[0] - dx
                && r1[1] >= r2[1] - dy
                && r1[0] + r1[2] <= r2[0] + r2[2] + dx
                && r1[1] + r1[3] <= r2[1] + r2[3] + dy
                && (n2 > n1.max(3) || n1 < 3)
        });

        if !swallowed {
            if let Some(bbox) = BoundingBox::from_signed(r1[0], r1[1], r1[2], r1[3]) {
                out.push(bbox);
            }
        }
    }
    out
}

fn similar(a: &BoundingBox, b: &BoundingBox, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) as f64 + a.height.min(b.height) as f64) * 0.5;
    let close = |p: u32, q: u32| (p as f64 - q as f64).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.right(), b.right())
        && close(a.bottom(), b.bottom())
}

/// Label equivalence classes of `items` under the transitive closure of `same`.
fn partition<T>(items: &[T], same: impl Fn(&T, &T) -> bool) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..items.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            if same(&items[i], &items[j]) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut labels = vec![usize::MAX; items.len()];
    let mut roots: Vec<usize> = Vec::new();
    for i in 0..items.len() {
        let root = find(&mut parent, i);
        let label = match roots.iter().position(|&r| r == root) {
            Some(l) => l,
            None => {
                roots.push(root);
                roots.len() - 1
            }
        };
        labels[i] = label;
    }
    labels
}

fn load_error(msg: &str) -> CloakError {
    CloakError::CascadeLoad(msg.to_string())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, CloakError> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| load_error(&format!("missing <{name}> element")))
}

fn optional_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(str::trim)
}

/// Element children of an OpenCV sequence node (each named `_`).
fn items<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn numbers<T: std::str::FromStr>(node: Node) -> Result<Vec<T>, CloakError> {
    node.text()
        .unwrap_or_default()
        .split_whitespace()
        .map(|tok| {
            tok.parse::<T>().map_err(|_| {
                load_error(&format!("invalid number '{tok}' in <{}>", node.tag_name().name()))
            })
        })
        .collect()
}

fn parse_one<T: std::str::FromStr>(node: Node) -> Result<T, CloakError> {
    numbers::<T>(node)?
        .into_iter()
        .next()
        .ok_or_else(|| load_error(&format!("empty <{}> element", node.tag_name().name())))
}

fn parse_feature(node: Node) -> Result<HaarFeature, CloakError> {
    if let Some(tilted) = optional_text(node, "tilted") {
        if tilted != "0" {
            return Err(load_error("tilted Haar features are not supported"));
        }
    }

    let rects = items(child(node, "rects")?)
        .map(|rect| {
            let values = numbers::<f32>(rect)?;
            let &[x, y, width, height, weight] = values.as_slice() else {
                return Err(load_error("feature rectangle needs five values"));
            };
            if x < 0.0 || y < 0.0 || width <= 0.0 || height <= 0.0 {
                return Err(load_error("feature rectangle has negative geometry"));
            }
            Ok(WeightedRect {
                x: x as u32,
                y: y as u32,
                width: width as u32,
                height: height as u32,
                weight,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if rects.is_empty() {
        return Err(load_error("feature without rectangles"));
    }
    Ok(HaarFeature { rects })
}

fn parse_stage(node: Node) -> Result<Stage, CloakError> {
    let threshold: f32 = parse_one(child(node, "stageThreshold")?)?;
    let classifiers = items(child(node, "weakClassifiers")?)
        .map(parse_weak_classifier)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak_classifier(node: Node) -> Result<WeakClassifier, CloakError> {
    let raw_nodes = numbers::<f64>(child(node, "internalNodes")?)?;
    let leaves = numbers::<f32>(child(node, "leafValues")?)?;

    if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
        return Err(load_error("internalNodes must hold groups of four values"));
    }
    let nodes: Vec<TreeNode> = raw_nodes
        .chunks_exact(4)
        .map(|c| TreeNode {
            left: c[0] as i32,
            right: c[1] as i32,
            feature: c[2] as usize,
            threshold: c[3] as f32,
        })
        .collect();

    // Child nodes must come after their parent, so every walk terminates.
    for (i, node) in nodes.iter().enumerate() {
        for child in [node.left, node.right] {
            if child > 0 && (child as usize <= i || child as usize >= nodes.len()) {
                return Err(load_error(&format!("node {i} has invalid child {child}")));
            }
        }
    }

    let max_leaf = nodes
        .iter()
        .flat_map(|n| [n.left, n.right])
        .filter(|&i| i <= 0)
        .map(|i| (-i) as usize)
        .max()
        .unwrap_or(0);
    if max_leaf >= leaves.len() {
        return Err(load_error("leafValues shorter than the tree references"));
    }

    Ok(WeakClassifier { nodes, leaves })
}
