use anyhow::Result;
use mesh_leveller::app::run;

fn main() -> Result<()> {
    run()
}
