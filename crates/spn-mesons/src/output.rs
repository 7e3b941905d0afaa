/// Builds `{prefix}{kind}[_{channel}][_{tstart}][_{tend}].{ext}`.
///
/// When only one window bound is known the other is written as `XX`, so a
/// half-specified window is visible in the filename.
pub fn output_filename(
    prefix: &str,
    kind: &str,
    channel: Option<&str>,
    tstart: Option<usize>,
    tend: Option<usize>,
    ext: &str,
) -> String {
    let mut name = format!("{prefix}{kind}");
    if let Some(channel) = channel.filter(|channel| !channel.is_empty()) {
        name.push('_');
        name.push_str(channel);
    }
    match (tstart, tend) {
        (None, None) => {}
        (start, end) => {
            let bound =
                |value: Option<usize>| value.map_or_else(|| "XX".to_string(), |v| v.to_string());
            name.push_str(&format!("_{}_{}", bound(start), bound(end)));
        }
    }
    name.push('.');
    name.push_str(ext);
    name
}
