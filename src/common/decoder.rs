use serde_json::{Deserializer, Value};
use slog_scope::info;

/// Splits a buffer of concatenated JSON documents into individual values.
///
/// Alarm events arrive as one opaque text blob per stream message, holding
/// zero or more JSON objects back to back with no separator. Anything before
/// the first opening brace is framing garbage and gets trimmed. Decoding
/// stops at the first malformed token and the valid prefix is returned, so a
/// truncated trailer never fails the whole message.
pub fn decode(input: &str) -> Vec<Value> {
    let start = match input.find('{') {
        Some(index) => index,
        None => return Vec::new(),
    };

    let mut values = Vec::new();
    let mut stream = Deserializer::from_str(&input[start..]).into_iter::<Value>();

    loop {
        match stream.next() {
            Some(Ok(value)) => values.push(value),
            Some(Err(error)) => {
                info!(
                    "Error parsing the json string";
                    "error" => %error,
                    "decoded" => values.len()
                );

                break;
            }
            None => break,
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::test_logger;

    fn document(rule_id: &str) -> String {
        format!(
            "{{\"Rule_id\":\"{}\",\"Rule_description\":\"desc\",\"Actions\":[]}}",
            rule_id
        )
    }

    #[test]
    fn empty_input_decodes_to_nothing() {
        test_logger();

        assert!(decode("").is_empty());
        assert!(decode("   ").is_empty());
    }

    #[test]
    fn input_without_an_object_decodes_to_nothing() {
        test_logger();

        assert!(decode("not json at all").is_empty());
    }

    #[test]
    fn concatenated_documents_decode_in_order() {
        test_logger();

        for count in &[1usize, 2, 5] {
            let input: String = (0..*count).map(|i| document(&format!("rule-{}", i))).collect();
            let values = decode(&input);

            assert_eq!(*count, values.len());

            for (i, value) in values.iter().enumerate() {
                assert_eq!(format!("rule-{}", i), value["Rule_id"]);
            }
        }
    }

    #[test]
    fn leading_garbage_is_trimmed() {
        test_logger();

        let input = format!("\u{1}\u{2}garbage{}", document("rule-0"));
        let values = decode(&input);

        assert_eq!(1, values.len());
        assert_eq!("rule-0", values[0]["Rule_id"]);
    }

    #[test]
    fn truncated_trailer_keeps_the_valid_prefix() {
        test_logger();

        let input = format!("{}{}{{\"Rule_id\":\"rul", document("rule-0"), document("rule-1"));
        let values = decode(&input);

        assert_eq!(2, values.len());
        assert_eq!("rule-0", values[0]["Rule_id"]);
        assert_eq!("rule-1", values[1]["Rule_id"]);
    }

    #[test]
    fn malformed_middle_document_drops_the_rest() {
        test_logger();

        let input = format!("{}{{not valid}}{}", document("rule-0"), document("rule-1"));
        let values = decode(&input);

        assert_eq!(1, values.len());
        assert_eq!("rule-0", values[0]["Rule_id"]);
    }
}
