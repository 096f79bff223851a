/// Concatenated answer for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub fragments: usize,
}

/// Folds fragments into one string with no separator.
///
/// Stops at the first error; the partial text is discarded with it.
pub fn accumulate<I, E>(fragments: I) -> Result<Answer, E>
where
    I: IntoIterator<Item = Result<String, E>>,
{
    let mut answer = Answer::default();
    for fragment in fragments {
        answer.text.push_str(&fragment?);
        answer.fragments += 1;
    }
    Ok(answer)
}
