#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvolutionError {
    #[error("convolution kernel is empty")]
    EmptyKernel,
    #[error("convolution kernel peak must be finite and > 0, got {value}")]
    InvalidKernelPeak { value: f64 },
    #[error("convolution kernel value must be finite at index {index}, got {value}")]
    NonFiniteKernel { index: usize, value: f64 },
}

/// Linear convolution cropped to the length of `signal` and centred on the
/// full convolution, i.e. output index `i` reads full index `i + (k - 1) / 2`.
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let signal_len = signal.len();
    let kernel_len = kernel.len();
    if signal_len == 0 || kernel_len == 0 {
        return vec![0.0; signal_len];
    }

    let offset = (kernel_len - 1) / 2;
    let mut output = vec![0.0; signal_len];
    for (index, value) in output.iter_mut().enumerate() {
        let full_index = index + offset;
        let first = full_index.saturating_sub(signal_len - 1);
        let last = full_index.min(kernel_len - 1);

        let mut accumulated = 0.0;
        for kernel_index in first..=last {
            accumulated += kernel[kernel_index] * signal[full_index - kernel_index];
        }
        *value = accumulated;
    }

    output
}

/// Validates a kernel and returns its contiguous core, dropping leading and
/// trailing samples that do not exceed `peak * ratio`.
pub fn trim_kernel_tails(kernel: &[f64], ratio: f64) -> Result<&[f64], ConvolutionError> {
    if kernel.is_empty() {
        return Err(ConvolutionError::EmptyKernel);
    }
    if let Some((index, value)) = kernel
        .iter()
        .copied()
        .enumerate()
        .find(|(_, value)| !value.is_finite())
    {
        return Err(ConvolutionError::NonFiniteKernel { index, value });
    }

    let peak = kernel.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if peak <= 0.0 {
        return Err(ConvolutionError::InvalidKernelPeak { value: peak });
    }

    let threshold = peak * ratio;
    let first = kernel
        .iter()
        .position(|value| *value > threshold)
        .ok_or(ConvolutionError::EmptyKernel)?;
    let last = kernel
        .iter()
        .rposition(|value| *value > threshold)
        .ok_or(ConvolutionError::EmptyKernel)?;

    Ok(&kernel[first..=last])
}
