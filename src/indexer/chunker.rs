/// Splits extracted text into chunks of roughly `chunk_size` characters.
///
/// Paragraphs (blank-line separated) are packed together until the next one
/// would overflow; oversized paragraphs are cut at the last sentence boundary
/// in the second half of the window. Sizes are counted in `char`s.
pub fn split_text(content: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() <= chunk_size {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for para in trimmed.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = para.chars().count();

        if current_len > 0 && current_len + para_len + 2 > chunk_size {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if para_len > chunk_size {
            chunks.extend(split_long_paragraph(para, chunk_size));
            continue;
        }

        if current_len > 0 {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(para);
        current_len += para_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn is_boundary(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n' | '。' | '।')
}

/// Cut an oversized paragraph, preferring sentence ends.
fn split_long_paragraph(para: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = para.chars().collect();

    while rest.len() > chunk_size {
        let cut = (chunk_size / 2..chunk_size)
            .rev()
            .find(|&i| is_boundary(rest[i]))
            .map_or(chunk_size, |i| i + 1);

        let head: String = rest[..cut].iter().collect();
        let head = head.trim();
        if !head.is_empty() {
            chunks.push(head.to_string());
        }

        let tail: String = rest[cut..].iter().collect();
        rest = tail.trim_start().chars().collect();
    }

    let tail: String = rest.into_iter().collect();
    let tail = tail.trim();
    if !tail.is_empty() {
        chunks.push(tail.to_string());
    }

    chunks
}
