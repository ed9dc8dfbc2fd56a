// Text normalization shared by the classifier and the extractor.
// Every substring/token match in the pipeline runs over normalized text so
// that accented and unaccented variants of labels match uniformly.

/// Strip diacritical marks, collapse whitespace runs to a single space, trim.
///
/// Total function: any input produces a valid output. Characters outside the
/// folded set pass through unchanged (punctuation is kept, the classifier
/// strips separators on its own).
pub fn normalize(text: &str) -> String {
    let folded: String = text.chars().map(fold_char).collect();

    let mut out = String::with_capacity(folded.len());
    let mut last_was_space = false;
    for c in folded.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }

    out.trim().to_string()
}

/// Map an accented Latin character to its base letter.
/// Covers the set that appears in Argentine payroll receipts.
fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'A',
        'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
        'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'Ñ' => 'N',
        'Ç' => 'C',
        _ => c,
    }
}

/// Remove filename separators so that "t.y.s.a" / "t_y_s_a" / "t-y-s-a"
/// all collapse to "tysa" before token matching.
pub fn strip_separators(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '.' | '_' | '-') && !c.is_whitespace())
        .collect()
}

/// Length of the longest run of consecutive uppercase letters.
/// Used by the name heuristic: "PEREZ JUAN CARLOS" has a run of 5.
pub fn uppercase_run_len(text: &str) -> usize {
    let mut best = 0;
    let mut current = 0;
    for c in text.chars() {
        if c.is_uppercase() {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}
