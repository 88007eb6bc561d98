/// Decode the rule-file escape syntax into raw bytes.
///
/// Supported escapes: `\n`, `\t`, `\r`, `\\` for their control/literal
/// byte, and `\xHH` which consumes up to two hex digits (stopping at the
/// first non-hex character; value 0 if none follow) and emits one byte.
/// A backslash before any other character emits that character with the
/// backslash dropped; a lone trailing backslash emits a literal
/// backslash. Everything else copies unchanged.
///
/// Decoding only ever shrinks the input, so the output length is bounded
/// by the field length checked at parse time.
pub fn decode_escapes(field: &str) -> Vec<u8> {
	let bytes = field.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;

	while i < bytes.len() {
		if bytes[i] != b'\\' {
			out.push(bytes[i]);
			i += 1;
			continue;
		}

		// Lone trailing backslash: nothing to consume.
		let Some(&next) = bytes.get(i + 1) else {
			out.push(b'\\');
			break;
		};

		match next {
			b'n' => {
				out.push(b'\n');
				i += 2;
			}
			b't' => {
				out.push(b'\t');
				i += 2;
			}
			b'r' => {
				out.push(b'\r');
				i += 2;
			}
			b'\\' => {
				out.push(b'\\');
				i += 2;
			}
			b'x' => {
				i += 2;
				let mut value: u8 = 0;
				for _ in 0..2 {
					match bytes.get(i).and_then(|&b| (b as char).to_digit(16)) {
						Some(digit) => {
							value = (value << 4) | digit as u8;
							i += 1;
						}
						None => break,
					}
				}
				out.push(value);
			}
			other => {
				// Unknown escape: the character itself, backslash dropped.
				out.push(other);
				i += 2;
			}
		}
	}

	out
}
