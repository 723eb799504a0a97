/// Round half away from zero to `digits` decimal places.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

/// Celsius to Fahrenheit, rounded to one decimal place.
pub fn c_to_f(celsius: f64) -> f64 {
    round_to(celsius * 9.0 / 5.0 + 32.0, 1)
}
