//! Faddeeva function `w(z) = exp(-z²)·erfc(-iz)` for the upper half plane.
//!
//! Uses the four-region rational approximation of Humlíček (JQSRT 27, 437,
//! 1982). Relative accuracy is about 1e-4.

use num_complex::Complex64;

const INV_SQRT_PI: f64 = 0.564_189_583_547_756_3;

/// Evaluates `w(x + iy)` for `y >= 0`. Negative `y` is clamped to zero.
pub fn faddeeva(z: Complex64) -> Complex64 {
    let x = z.re;
    let y = z.im.max(0.0);
    let t = Complex64::new(y, -x);
    let s = x.abs() + y;

    if s >= 15.0 {
        return t * INV_SQRT_PI / (0.5 + t * t);
    }

    if s >= 5.5 {
        let u = t * t;
        return t * (1.410_474 + u * INV_SQRT_PI) / (0.75 + u * (3.0 + u));
    }

    if y >= 0.195 * x.abs() - 0.176 {
        let numerator =
            16.4955 + t * (20.20933 + t * (11.96482 + t * (3.778987 + t * 0.5642236)));
        let denominator = 16.4955
            + t * (38.82363 + t * (39.27121 + t * (21.69274 + t * (6.699398 + t))));
        return numerator / denominator;
    }

    let u = t * t;
    let numerator = t
        * (36183.31
            - u * (3321.9905
                - u * (1540.787 - u * (219.0313 - u * (35.76683 - u * (1.320522 - u * 0.56419))))));
    let denominator = 32066.6
        - u * (24322.84
            - u * (9022.228
                - u * (2186.181 - u * (364.2191 - u * (61.57037 - u * (1.841439 - u))))));
    u.exp() - numerator / denominator
}

/// Real part of `w(x + iy)`, the Voigt function `K(x, y)`.
pub fn voigt_function(x: f64, y: f64) -> f64 {
    faddeeva(Complex64::new(x, y)).re
}
