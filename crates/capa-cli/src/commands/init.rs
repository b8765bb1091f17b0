//! The `capa init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("capa.toml").exists() {
        println!("capa.toml already exists, skipping.");
    } else {
        std::fs::write("capa.toml", SAMPLE_CONFIG)?;
        println!("Created capa.toml");
    }

    std::fs::create_dir_all("problems")?;
    let example_path = std::path::Path::new("problems/example.xml");
    if example_path.exists() {
        println!("problems/example.xml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_PROBLEM)?;
        println!("Created problems/example.xml");
    }

    println!("\nNext steps:");
    println!("  1. Run: capa validate problems");
    println!("  2. Run: capa render problems/example.xml --page -o example.html");
    println!("  3. Run: capa answers problems/example.xml --seed 1");
    println!("  4. Run: capa check problems/example.xml --seed 1 --state state.json --answer example_2_1=10");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# capa configuration

[xqueue]
# url = "http://localhost:18040"
username = "lms"
password = "${CAPA_XQUEUE_PASSWORD}"
default_queue = "default"
callback_url = "http://localhost:8000/courseware/xqueue/callback"
timeout_secs = 10
# Accept code submissions without a real queue.
mock = true

[sandbox]
timeout_ms = 2000
max_operations = 5000000

[problem]
rerandomize = "onreset"
anonymous_student_id = "student"
"#;

const EXAMPLE_PROBLEM: &str = r#"<problem>
<script type="loncapa/rhai">
let r = random_int(2, 9) * 100;
let i = random_int(1, 5) / 100.0;
let v = r * i;
</script>

<p>A current of $i A flows through a $r ohm resistor.</p>

<numericalresponse answer="$v">
  <label>What is the voltage across the resistor, in volts?</label>
  <responseparam type="tolerance" default="1%"/>
  <formulaequationinput/>
</numericalresponse>

<multiplechoiceresponse>
  <label>Which law did you use?</label>
  <choicegroup type="MultipleChoice" shuffle="true">
    <choice correct="true">Ohm's law</choice>
    <choice correct="false">Kirchhoff's current law</choice>
    <choice correct="false">Faraday's law</choice>
    <choice correct="false" fixed="true">None of the above</choice>
  </choicegroup>
</multiplechoiceresponse>

<solution>
<p>V = I R = $v V.</p>
</solution>
</problem>
"#;
