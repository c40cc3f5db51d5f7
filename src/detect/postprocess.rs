//! Decoding of YOLOv8-style detection heads and non-max suppression.
//!
//! The head output is `[4 + nc, anchors]`: rows 0..4 hold `cx, cy, w, h` in
//! model-input pixels, the remaining rows hold per-class scores.

use anyhow::{anyhow, Result};

use super::result::{BoundingBox, Detection};

/// Parameters for turning raw head output into detections.
#[derive(Clone, Debug)]
pub struct DecodeParams<'a> {
    pub confidence: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Model-input to frame scale factors.
    pub scale_x: f32,
    pub scale_y: f32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub class_names: &'a [String],
}

/// Decode a row-major `[4 + nc, anchors]` tensor.
pub fn decode_yolov8(
    output: &[f32],
    anchors: usize,
    params: &DecodeParams<'_>,
) -> Result<Vec<Detection>> {
    if anchors == 0 || output.len() % anchors != 0 {
        return Err(anyhow!(
            "output of {} values does not divide into {} anchors",
            output.len(),
            anchors
        ));
    }
    let rows = output.len() / anchors;
    if rows <= 4 {
        return Err(anyhow!("output has {} rows, expected 4 + classes", rows));
    }
    let classes = rows - 4;
    let at = |row: usize, anchor: usize| output[row * anchors + anchor];

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (0..classes)
            .map(|c| (c, at(4 + c, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if !score.is_finite() || score < params.confidence {
            continue;
        }
        let bbox = BoundingBox::from_cxcywh(
            at(0, anchor) * params.scale_x,
            at(1, anchor) * params.scale_y,
            at(2, anchor) * params.scale_x,
            at(3, anchor) * params.scale_y,
        )
        .clamped(params.frame_width, params.frame_height);
        let class_name = params
            .class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{}", class_id));
        candidates.push(Detection::new(class_id, class_name, score, bbox));
    }

    non_max_suppression(&mut candidates, params.iou_threshold);
    candidates.truncate(params.max_detections);
    Ok(candidates)
}

/// Class-aware greedy NMS. Keeps the highest-confidence box of each overlapping group.
pub fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..detections.len() {
        let suppressed = (0..kept).any(|prev| {
            detections[prev].class_id == detections[index].class_id
                && detections[prev].bbox.iou(&detections[index].bbox) > iou_threshold
        });
        if !suppressed {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["smoke".to_string(), "fire".to_string()]
    }

    fn params(names: &[String]) -> DecodeParams<'_> {
        DecodeParams {
            confidence: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
            scale_x: 2.0,
            scale_y: 1.0,
            frame_width: 200,
            frame_height: 100,
            class_names: names,
        }
    }

    #[test]
    fn decodes_and_suppresses_overlaps() -> Result<()> {
        // Three anchors: two overlapping fire boxes and one weak smoke box.
        #[rustfmt::skip]
        let output = vec![
            // cx
            20.0, 21.0, 70.0,
            // cy
            50.0, 50.0, 20.0,
            // w
            10.0, 10.0, 10.0,
            // h
            20.0, 20.0, 10.0,
            // smoke scores
            0.05, 0.01, 0.10,
            // fire scores
            0.90, 0.60, 0.02,
        ];
        let names = names();
        let detections = decode_yolov8(&output, 3, &params(&names))?;
        assert_eq!(detections.len(), 1);
        let fire = &detections[0];
        assert_eq!(fire.class_name, "fire");
        assert_eq!(fire.class_id, 1);
        assert!((fire.confidence - 0.90).abs() < 1e-6);
        assert!((fire.bbox.x1 - 30.0).abs() < 1e-4);
        assert!((fire.bbox.x2 - 50.0).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn nms_keeps_overlapping_boxes_of_different_classes() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let mut detections = vec![
            Detection::new(0, "smoke", 0.5, bbox),
            Detection::new(1, "fire", 0.9, bbox),
            Detection::new(1, "fire", 0.8, bbox),
        ];
        non_max_suppression(&mut detections, 0.45);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_name, "fire");
        assert_eq!(detections[1].class_name, "smoke");
    }

    #[test]
    fn rejects_malformed_output() {
        let names = names();
        assert!(decode_yolov8(&[0.0; 7], 2, &params(&names)).is_err());
        assert!(decode_yolov8(&[0.0; 8], 2, &params(&names)).is_err());
    }
}
