use super::SurfaceErrorAction;

/// Picks `requested` if the surface supports it, otherwise a supported format
/// with the same sRGB-ness, otherwise the first one.
pub(crate) fn choose_surface_format(
    formats: &[wgpu::TextureFormat],
    requested: wgpu::TextureFormat,
) -> Option<wgpu::TextureFormat> {
    if formats.contains(&requested) {
        return Some(requested);
    }

    let srgb = requested.is_srgb();
    let preferred = if srgb {
        [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ]
    } else {
        [
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Rgba8Unorm,
        ]
    };
    for f in preferred {
        if formats.contains(&f) {
            return Some(f);
        }
    }

    formats
        .iter()
        .copied()
        .find(|f| f.is_srgb() == srgb)
        .or_else(|| formats.first().copied())
}

/// Falls back to the matching `Auto*` mode, which every surface accepts.
pub(crate) fn choose_present_mode(
    modes: &[wgpu::PresentMode],
    requested: wgpu::PresentMode,
) -> wgpu::PresentMode {
    if modes.contains(&requested) {
        return requested;
    }
    match requested {
        wgpu::PresentMode::Immediate
        | wgpu::PresentMode::Mailbox
        | wgpu::PresentMode::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        _ => wgpu::PresentMode::AutoVsync,
    }
}

pub(crate) fn choose_alpha_mode(
    modes: &[wgpu::CompositeAlphaMode],
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| modes.contains(m))
        .or_else(|| modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Largest power-of-two sample count `<= requested` accepted by `supported`.
pub(crate) fn choose_sample_count(requested: u32, supported: impl Fn(u32) -> bool) -> u32 {
    let requested = requested.clamp(1, 16);
    let mut n = 1u32 << (31 - requested.leading_zeros());
    while n > 1 {
        if supported(n) {
            return n;
        }
        n /= 2;
    }
    1
}

pub(crate) fn map_surface_error(err: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::ResetDevice,
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
        wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::{PresentMode, TextureFormat};

    #[test]
    fn requested_format_wins_when_supported() {
        let formats = [TextureFormat::Bgra8UnormSrgb, TextureFormat::Rgba8Unorm];
        assert_eq!(
            choose_surface_format(&formats, TextureFormat::Rgba8Unorm),
            Some(TextureFormat::Rgba8Unorm)
        );
    }

    #[test]
    fn unsupported_format_falls_back_by_srgbness() {
        let formats = [TextureFormat::Bgra8UnormSrgb, TextureFormat::Bgra8Unorm];
        assert_eq!(
            choose_surface_format(&formats, TextureFormat::Rgba8Unorm),
            Some(TextureFormat::Bgra8Unorm)
        );
        assert_eq!(
            choose_surface_format(&formats, TextureFormat::Rgba8UnormSrgb),
            Some(TextureFormat::Bgra8UnormSrgb)
        );
        assert_eq!(choose_surface_format(&[], TextureFormat::Rgba8Unorm), None);
    }

    #[test]
    fn present_mode_falls_back_to_auto() {
        let modes = [PresentMode::Fifo];
        assert_eq!(choose_present_mode(&modes, PresentMode::Immediate), PresentMode::AutoNoVsync);
        assert_eq!(choose_present_mode(&modes, PresentMode::FifoRelaxed), PresentMode::AutoVsync);
        assert_eq!(choose_present_mode(&modes, PresentMode::Fifo), PresentMode::Fifo);
    }

    #[test]
    fn sample_count_steps_down_to_a_supported_power_of_two() {
        assert_eq!(choose_sample_count(2, |n| n == 2 || n == 4), 2);
        assert_eq!(choose_sample_count(8, |n| n == 4), 4);
        assert_eq!(choose_sample_count(3, |n| n == 2), 2);
        assert_eq!(choose_sample_count(4, |_| false), 1);
        assert_eq!(choose_sample_count(0, |_| true), 1);
    }

    #[test]
    fn lost_and_outdated_request_a_reset() {
        assert_eq!(map_surface_error(&wgpu::SurfaceError::Lost), SurfaceErrorAction::ResetDevice);
        assert_eq!(
            map_surface_error(&wgpu::SurfaceError::Outdated),
            SurfaceErrorAction::ResetDevice
        );
        assert_eq!(map_surface_error(&wgpu::SurfaceError::Timeout), SurfaceErrorAction::SkipFrame);
        assert_eq!(map_surface_error(&wgpu::SurfaceError::OutOfMemory), SurfaceErrorAction::Fatal);
    }
}
