use super::{Formatter, Ident};

use keel_core::Result;

impl Formatter<'_> {
    /// `DELETE FROM "t"[ OUTPUT DELETED..][ WHERE ..][ ORDER BY ..][ LIMIT n][ RETURNING ..]`
    pub(super) fn delete(&mut self) -> Result<()> {
        let table = self.target_table()?;
        let returning = self.returning_columns(self.main_model(), "RETURNING")?;

        fmt!(self, "DELETE FROM ", Ident(table));
        self.output_clause(&returning, "DELETED");
        self.where_clause(None)?;
        self.modify_order_and_limit("DELETE")?;
        self.returning_clause(&returning);

        Ok(())
    }
}
