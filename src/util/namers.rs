use std::collections::HashSet;

/// Hands out names that are unique among all the names it has handed out.
pub struct UniqueNamer {
    taken_names: HashSet<String>,
}

impl UniqueNamer {
    pub fn new() -> UniqueNamer {
        UniqueNamer { taken_names: HashSet::new() }
    }

    /// Returns a name, either `desired_name` or `desired_name` followed by
    /// the smallest number that makes it fresh, which has never been returned
    /// by a prior call on the same `UniqueNamer`.
    pub fn get_fresh_name<S: AsRef<str>>(&mut self, desired_name: S) -> String {
        let desired_name = desired_name.as_ref();
        let chosen_name =
            if !self.taken_names.contains(desired_name) {
                desired_name.to_string()
            } else {
                let mut name = String::new();
                for i in 1.. {
                    name = format!("{}{}", desired_name, i);
                    if !self.taken_names.contains(&name) {
                        break;
                    }
                }
                name
            };
        self.taken_names.insert(chosen_name.clone());
        chosen_name
    }

    /// Marks a name as taken without returning it, eg. for names fixed by
    /// the format.
    pub fn reserve<S: Into<String>>(&mut self, name: S) {
        self.taken_names.insert(name.into());
    }
}

#[test]
fn test_unique_namer() {
    let mut un = UniqueNamer::new();
    assert_eq!(un.get_fresh_name("A"), "A");
    assert_eq!(un.get_fresh_name("A"), "A1");
    assert_eq!(un.get_fresh_name("A"), "A2");
    assert_eq!(un.get_fresh_name("B"), "B");
    assert_eq!(un.get_fresh_name("A"), "A3");
}

#[test]
fn test_reserve() {
    let mut un = UniqueNamer::new();
    un.reserve("scene");
    assert_eq!(un.get_fresh_name("scene"), "scene1");
    // "A1" is taken by a real name, so the second "A" skips to "A2"
    assert_eq!(un.get_fresh_name("A1"), "A1");
    assert_eq!(un.get_fresh_name("A"), "A");
    assert_eq!(un.get_fresh_name("A"), "A2");
}
