pub fn is_valid_email(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > 320 {
        return false;
    }

    let mut segments = trimmed.split('@');
    let local = segments.next().unwrap_or_default();
    let domain = segments.next().unwrap_or_default();

    if segments.next().is_some() {
        return false;
    }

    if local.is_empty() || domain.is_empty() {
        return false;
    }

    if local
        .bytes()
        .any(|ch| ch <= b' ' || matches!(ch, b'@' | b';' | b',' | b'"'))
    {
        return false;
    }

    if domain
        .bytes()
        .any(|ch| ch <= b' ' || matches!(ch, b'@' | b';' | b',' | b'"'))
    {
        return false;
    }

    domain.contains('.')
}
