use pickcam_core::GrayImage;
use pickcam_marker::{dict_4x4_50, Dictionary, MarkerDetector, MarkerTracker};

const BORDER_BITS: usize = 1;

fn stamp_marker(canvas: &mut GrayImage, dict: &Dictionary, id: usize, cell_px: usize, x0: usize, y0: usize) {
    let bits = dict.marker_size;
    let cells = bits + 2 * BORDER_BITS;
    let code = dict.codes[id];

    for cy in 0..cells {
        for cx in 0..cells {
            let on_border = cx == 0 || cy == 0 || cx + 1 == cells || cy + 1 == cells;
            let is_black = if on_border {
                true
            } else {
                let bx = cx - BORDER_BITS;
                let by = cy - BORDER_BITS;
                (code >> (by * bits + bx)) & 1 == 1
            };
            if !is_black {
                continue;
            }
            for yy in 0..cell_px {
                for xx in 0..cell_px {
                    let x = x0 + cx * cell_px + xx;
                    let y = y0 + cy * cell_px + yy;
                    canvas.data[y * canvas.width + x] = 0;
                }
            }
        }
    }
}

fn white_canvas(w: usize, h: usize) -> GrayImage {
    GrayImage {
        width: w,
        height: h,
        data: vec![255u8; w * h],
    }
}

#[test]
fn two_markers_in_one_frame() {
    let dict = dict_4x4_50();
    let mut canvas = white_canvas(280, 150);
    stamp_marker(&mut canvas, dict, 0, 10, 20, 20);
    stamp_marker(&mut canvas, dict, 3, 10, 180, 60);

    let mut dets = MarkerDetector::with_default_family().detect(&canvas.view());
    dets.sort_by_key(|d| d.id);

    assert_eq!(dets.len(), 2);
    assert_eq!(dets[0].id, 0);
    assert_eq!(dets[1].id, 3);

    assert!((dets[0].center.x - 49.5).abs() < 2.0);
    assert!((dets[0].center.y - 49.5).abs() < 2.0);
    assert!((dets[1].center.x - 209.5).abs() < 2.0);
    assert!((dets[1].center.y - 89.5).abs() < 2.0);
}

#[test]
fn tracker_drops_foreign_ids() {
    let dict = dict_4x4_50();
    let mut canvas = white_canvas(280, 150);
    stamp_marker(&mut canvas, dict, 0, 10, 20, 20);
    stamp_marker(&mut canvas, dict, 3, 10, 180, 60);

    let tracker = MarkerTracker::new(MarkerDetector::with_default_family(), 0);
    let centers = tracker.locate(&canvas.view());

    assert_eq!(centers.len(), 1);
    let c = centers.get(&0).expect("tracked marker present");
    assert!((c.x - 49.5).abs() < 2.0);
    assert!((c.y - 49.5).abs() < 2.0);
}

#[test]
fn tracker_reports_nothing_without_its_marker() {
    let dict = dict_4x4_50();
    let mut canvas = white_canvas(280, 150);
    stamp_marker(&mut canvas, dict, 3, 10, 180, 60);

    let tracker = MarkerTracker::new(MarkerDetector::with_default_family(), 0);
    assert!(tracker.locate(&canvas.view()).is_empty());
}
