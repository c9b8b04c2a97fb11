/// Execution context for one advance of a session.
pub struct Ctx {
    session_id: String,
    notes: Vec<String>,
}

impl Ctx {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            notes: vec![],
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Record something the user may want to see, like a tool being run.
    pub fn note(&mut self, msg: impl Into<String>) {
        self.notes.push(msg.into());
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Hand the collected notes to the caller, leaving none behind.
    pub fn take_notes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_notes_drains() {
        let mut ctx = Ctx::new("s1");
        ctx.note("running search");
        assert_eq!(ctx.notes(), ["running search"]);
        assert_eq!(ctx.take_notes(), vec!["running search".to_string()]);
        assert!(ctx.notes().is_empty());
        assert_eq!(ctx.session_id(), "s1");
    }
}
