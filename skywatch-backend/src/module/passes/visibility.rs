/// Civil twilight: the sky counts as dark once the Sun is this far below the horizon
pub const DARK_SKY_SUN_ALTITUDE_DEG: f64 = -6.0;

pub const LABEL_VISIBLE: &str = "Likely visible";
pub const LABEL_IN_SHADOW: &str = "Not visible (object in shadow)";
pub const LABEL_SKY_TOO_BRIGHT: &str = "Not visible (sky too bright)";
pub const LABEL_NOT_VISIBLE: &str = "Not visible";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub visible: bool,
    pub label: &'static str,
}

/// Naked-eye verdict from the observer's sun altitude and the object's
/// illumination at the same instant.
pub fn classify(sun_altitude_deg: f64, object_sunlit: bool) -> Visibility {
    let dark = sun_altitude_deg < DARK_SKY_SUN_ALTITUDE_DEG;
    let visible = dark && object_sunlit;

    let label = if visible {
        LABEL_VISIBLE
    } else if dark {
        LABEL_IN_SHADOW
    } else if object_sunlit {
        LABEL_SKY_TOO_BRIGHT
    } else {
        LABEL_NOT_VISIBLE
    };

    Visibility { visible, label }
}
