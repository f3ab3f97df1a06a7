use core::fmt;

/// What the screen and the log get once per tick
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Report {
    /// battery voltage, V
    pub voltage: f32,
    /// positive when discharging, A
    pub current: f32,
    pub soc_percent: f32,
    pub temperature_c: Option<f32>,
    /// sensors returned garbage, voltage and current are the last good ones
    pub stale: bool,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} V {:.3} A {:.1} %",
            self.voltage, self.current, self.soc_percent
        )?;
        if let Some(temperature) = self.temperature_c {
            write!(f, " {:.1} C", temperature)?;
        }
        if self.stale {
            f.write_str(" (stale)")?;
        }
        Ok(())
    }
}
