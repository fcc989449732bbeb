use std::borrow::Cow;
use std::path::{Path, Component};

pub trait PathExt: AsRef<Path> {
    /// The path with every trailing extension of its file name removed.
    fn without_extension(&self) -> Cow<'_, Path>;

    /// The path's normal components joined with `/`, regardless of platform.
    /// Returns `None` if the path is not valid UTF-8 or is not relative.
    fn to_slash_string(&self) -> Option<String>;
}

impl PathExt for Path {
    fn without_extension(&self) -> Cow<'_, Path> {
        if let Some(string) = self.to_str() {
            let mut last_ext = None;
            let mut past_trailing = false;
            for (i, c) in string.bytes().enumerate().rev() {
                if std::path::is_separator(c as char) {
                    if !past_trailing { continue; }
                    break;
                }

                past_trailing = true;
                if c == b'.' {
                    last_ext = Some(i);
                }
            }

            match last_ext {
                Some(0) | None => self.into(),
                Some(i) if std::path::is_separator(string.as_bytes()[i - 1] as char) => self.into(),
                Some(i) => Path::new(&string[..i]).into(),
            }
        } else {
            let mut path = self.to_path_buf();
            while path.extension().is_some() {
                path = path.with_extension("");
            }

            path.into()
        }
    }

    fn to_slash_string(&self) -> Option<String> {
        let mut string = String::new();
        for component in self.components() {
            match component {
                Component::Normal(part) => {
                    if !string.is_empty() { string.push('/'); }
                    string.push_str(part.to_str()?);
                }
                Component::CurDir => continue,
                _ => return None,
            }
        }

        Some(string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_extension_strips_all_extensions() {
        assert_eq!(Path::new("base.html").without_extension(), Path::new("base"));
        assert_eq!(Path::new("blog/post.tar.md").without_extension(), Path::new("blog/post"));
        assert_eq!(Path::new("a.b/nav").without_extension(), Path::new("a.b/nav"));
        assert_eq!(Path::new(".hidden").without_extension(), Path::new(".hidden"));
    }

    #[test]
    fn slash_strings_are_relative() {
        let path = Path::new("blog").join("post.md");
        assert_eq!(path.to_slash_string().as_deref(), Some("blog/post.md"));
        assert_eq!(Path::new("/abs").to_slash_string(), None);
        assert_eq!(Path::new("../up").to_slash_string(), None);
    }
}
