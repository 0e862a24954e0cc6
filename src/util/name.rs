use std::fmt;
use std::fmt::Write;

/// Wrapper that prints a name as a valid XML NCName (usable for `id` and
/// `sid` attributes).
///
/// Anything that isn't a letter, digit, `_`, `-` or `.` becomes `_`. If the
/// first character can't start a name, a `_` is put in front of it. The empty
/// name prints as `_`.
pub struct IdFmt<'a>(pub &'a str);

impl<'a> fmt::Display for IdFmt<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = self.0;
        match name.chars().next() {
            None => return f.write_char('_'),
            Some(c) if !(c.is_alphabetic() || c == '_') => f.write_char('_')?,
            Some(_) => (),
        }
        for c in name.chars() {
            let ok = c.is_alphanumeric() || c == '_' || c == '-' || c == '.';
            f.write_char(if ok { c } else { '_' })?;
        }
        Ok(())
    }
}

/// Wrapper that prints a name so it can be used as part of a file name.
pub struct FileNameFmt<'a>(pub &'a str);

impl<'a> fmt::Display for FileNameFmt<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_char('_');
        }
        for c in self.0.chars() {
            let bad = c.is_control() || "/\\:*?\"<>|".contains(c);
            f.write_char(if bad { '_' } else { c })?;
        }
        Ok(())
    }
}

/// Escapes text for use in XML character data and attribute values.
pub struct XmlText<'a>(pub &'a str);

impl<'a> fmt::Display for XmlText<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                '\'' => f.write_str("&apos;")?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}

#[test]
fn test_id_fmt() {
    assert_eq!(IdFmt("Cube").to_string(), "Cube");
    assert_eq!(IdFmt("Cube.001").to_string(), "Cube.001");
    assert_eq!(IdFmt("my mesh#2").to_string(), "my_mesh_2");
    assert_eq!(IdFmt("3d").to_string(), "_3d");
    assert_eq!(IdFmt("").to_string(), "_");
    assert_eq!(IdFmt("-x").to_string(), "_-x");
}

#[test]
fn test_escapes() {
    assert_eq!(FileNameFmt("a/b:c").to_string(), "a_b_c");
    assert_eq!(XmlText("a<b & \"c\"").to_string(), "a&lt;b &amp; &quot;c&quot;");
}
