use crate::catalog::ProductCatalog;
use crate::types::{BoundingBox, DetectionFrame};

/// An object detection the hand is currently pointing at.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub product_name: String,
    pub score: f32,
    pub bbox: BoundingBox,
}

/// Every catalog object whose box contains the pointer landmark, bounds inclusive.
///
/// No hand or no objects yields nothing. Several simultaneous hits are all returned,
/// in detection order.
pub fn match_candidates(frame: &DetectionFrame, catalog: &ProductCatalog) -> Vec<MatchCandidate> {
    let hand = match &frame.hand {
        Some(hand) if !frame.objects.is_empty() => hand,
        _ => return Vec::new(),
    };
    let pointer = hand.landmarks.pointer();

    frame
        .objects
        .iter()
        .filter(|o| catalog.contains(&o.class))
        .filter(|o| o.bbox.contains(pointer.x, pointer.y))
        .map(|o| MatchCandidate {
            product_name: o.class.clone(),
            score: o.score,
            bbox: o.bbox,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HandDetection, LandmarkSet, ObjectDetection, Point3D, Product};

    fn catalog() -> ProductCatalog {
        ProductCatalog::new(vec![
            Product { id: 3, name: "coffee".into(), price: 4.5 },
            Product { id: 4, name: "bottle".into(), price: 1.0 },
        ])
        .unwrap()
    }

    /// Every landmark far away except the pointer.
    fn hand_pointing_at(x: f32, y: f32) -> HandDetection {
        let mut points = vec![Point3D::new(-500.0, -500.0, 0.0); 21];
        points[4] = Point3D::new(x, y, 0.0);
        let landmarks = LandmarkSet::from_points(points).unwrap();
        HandDetection { bounding_box: landmarks.extent(), landmarks }
    }

    fn object(class: &str, x: f32, y: f32, w: f32, h: f32) -> ObjectDetection {
        ObjectDetection { class: class.into(), score: 0.8, bbox: BoundingBox::new(x, y, w, h) }
    }

    #[test]
    fn pointer_inside_catalog_object_matches() {
        let frame = DetectionFrame {
            hand: Some(hand_pointing_at(50.0, 50.0)),
            objects: vec![object("coffee", 0.0, 0.0, 100.0, 100.0)],
            gesture: None,
        };
        let hits = match_candidates(&frame, &catalog());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].product_name, "coffee");
    }

    #[test]
    fn edges_count_as_inside() {
        let catalog = catalog();
        for (x, y) in [(10.0, 20.0), (110.0, 20.0), (10.0, 70.0), (110.0, 70.0), (60.0, 20.0)] {
            let frame = DetectionFrame {
                hand: Some(hand_pointing_at(x, y)),
                objects: vec![object("coffee", 10.0, 20.0, 100.0, 50.0)],
                gesture: None,
            };
            assert_eq!(match_candidates(&frame, &catalog).len(), 1, "({x}, {y})");
        }
        let outside = DetectionFrame {
            hand: Some(hand_pointing_at(110.5, 70.0)),
            objects: vec![object("coffee", 10.0, 20.0, 100.0, 50.0)],
            gesture: None,
        };
        assert!(match_candidates(&outside, &catalog).is_empty());
    }

    #[test]
    fn only_the_pointer_landmark_counts() {
        let mut points = vec![Point3D::new(50.0, 50.0, 0.0); 21];
        points[4] = Point3D::new(500.0, 500.0, 0.0);
        let landmarks = LandmarkSet::from_points(points).unwrap();
        let frame = DetectionFrame {
            hand: Some(HandDetection { bounding_box: landmarks.extent(), landmarks }),
            objects: vec![object("coffee", 0.0, 0.0, 100.0, 100.0)],
            gesture: None,
        };
        assert!(match_candidates(&frame, &catalog()).is_empty());
    }

    #[test]
    fn unknown_classes_are_ignored() {
        let frame = DetectionFrame {
            hand: Some(hand_pointing_at(5.0, 5.0)),
            objects: vec![object("person", 0.0, 0.0, 10.0, 10.0), object("Coffee", 0.0, 0.0, 10.0, 10.0)],
            gesture: None,
        };
        assert!(match_candidates(&frame, &catalog()).is_empty());
    }

    #[test]
    fn overlapping_objects_all_match() {
        let frame = DetectionFrame {
            hand: Some(hand_pointing_at(5.0, 5.0)),
            objects: vec![
                object("bottle", 0.0, 0.0, 10.0, 10.0),
                object("coffee", 0.0, 0.0, 20.0, 20.0),
                object("coffee", 50.0, 50.0, 20.0, 20.0),
            ],
            gesture: None,
        };
        let names: Vec<_> = match_candidates(&frame, &catalog())
            .into_iter()
            .map(|c| c.product_name)
            .collect();
        assert_eq!(names, vec!["bottle", "coffee"]);
    }

    #[test]
    fn no_hand_or_no_objects_yields_nothing() {
        let catalog = catalog();
        let no_hand = DetectionFrame {
            hand: None,
            objects: vec![object("coffee", 0.0, 0.0, 100.0, 100.0)],
            gesture: None,
        };
        assert!(match_candidates(&no_hand, &catalog).is_empty());
        let no_objects = DetectionFrame { hand: Some(hand_pointing_at(1.0, 1.0)), objects: vec![], gesture: None };
        assert!(match_candidates(&no_objects, &catalog).is_empty());
    }
}
