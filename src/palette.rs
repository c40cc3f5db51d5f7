//! Overlay colors keyed by class.

use image::Rgb;

/// Colors for the two trained classes.
pub const SMOKE: Rgb<u8> = Rgb([255, 0, 0]);
pub const FIRE: Rgb<u8> = Rgb([255, 165, 0]);

/// Fallback colors, cycled by class id.
pub const DEFAULT_COLORS: [Rgb<u8>; 8] = [
    Rgb([0, 0, 255]),
    Rgb([0, 255, 0]),
    Rgb([255, 0, 0]),
    Rgb([255, 255, 0]),
    Rgb([255, 0, 255]),
    Rgb([0, 255, 255]),
    Rgb([255, 0, 128]),
    Rgb([255, 128, 0]),
];

/// Label text color.
pub const LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

/// Color for a class: by name first, then by id, then the cycling palette.
pub fn color_for_class(class_id: usize, class_name: Option<&str>) -> Rgb<u8> {
    match class_name {
        Some("smoke") => return SMOKE,
        Some("fire") => return FIRE,
        _ => {}
    }
    match class_id {
        0 => SMOKE,
        1 => FIRE,
        id => DEFAULT_COLORS[id % DEFAULT_COLORS.len()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_wins_over_id() {
        assert_eq!(color_for_class(7, Some("fire")), FIRE);
        assert_eq!(color_for_class(0, Some("person")), SMOKE);
        assert_eq!(color_for_class(1, None), FIRE);
    }

    #[test]
    fn other_ids_cycle_the_palette() {
        assert_eq!(color_for_class(2, Some("person")), DEFAULT_COLORS[2]);
        assert_eq!(color_for_class(9, None), DEFAULT_COLORS[1]);
    }
}
