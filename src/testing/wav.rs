use std::f32::consts::TAU;
use std::path::PathBuf;

/// Write a mono 16-bit 440 Hz tone to the temp directory and return its path.
///
/// Files are namespaced by process id so parallel test binaries never share
/// a path; callers pick distinct `file_name`s within one binary.
pub fn write_test_wav(
    file_name: &str,
    seconds: f32,
    sample_rate: u32,
) -> Result<PathBuf, hound::Error> {
    let dir = std::env::temp_dir().join(format!("mastering_engine_{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(file_name);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    let frames = (seconds * sample_rate as f32).round() as u32;
    for n in 0..frames {
        let t = n as f32 / sample_rate as f32;
        let sample = (TAU * 440.0 * t).sin() * 0.5;
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(path)
}
