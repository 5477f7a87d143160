/*!
 * Broadcast byte transform.
 *
 * Every broadcast is upper-cased one ASCII byte at a time before it is
 * enqueued to recipients; non-ASCII bytes pass through unchanged and the
 * transformed length always equals the input length.
 */

/// Upper-case the ASCII bytes of `data`, passing non-ASCII bytes through.
pub fn uppercase_ascii(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b.to_ascii_uppercase()).collect()
}
